//! Name-level operations: create, link, unlink, mkdir, rmdir, rename,
//! symlinks and attribute updates. Each call composes [`crate::inode::InodeStore`],
//! [`crate::dir::DirTable`], [`crate::file_io::FileIo`] and the two
//! [`crate::bitmap::BitmapAllocator`]s (inode map, zone map); callers run
//! these inside a [`crate::tx::TxManager`] transaction.
//!
//! Grounded on the original `FileCreator.cpp`/`FileLinker.cpp`/
//! `FileDeleter.cpp`/`DirCreator.cpp`/`DirDeleter.cpp`/`SymlinkCreator.cpp`/
//! `AttributeUpdater.cpp`/`FileRenamer.cpp`.

use crate::bitmap::BitmapAllocator;
use crate::block_store::{BlockStore, Device};
use crate::consts::*;
use crate::dir::DirTable;
use crate::error::{Error, ErrorKind, Result};
use crate::file_io::FileIo;
use crate::inode::{now_timestamp, Inode, InodeStore};
use crate::open_table::OpenTable;
use crate::path::PathResolver;
use crate::zone_mapper::ZoneMapper;

fn validate_name(name: &str) -> Result<()> {
	if name.is_empty() || name.len() > DIRENT_NAME_MAX {
		return Err(Error::new(ErrorKind::NameLengthExceeded));
	}
	Ok(())
}

/// A timestamp update requested on `utimens`: leave it alone, stamp the
/// current time, or set an explicit value.
#[derive(Clone, Copy, Debug)]
pub enum TimeUpdate {
	Omit,
	Now,
	Set(u32),
}

impl TimeUpdate {
	fn apply(self, field: &mut u32) {
		match self {
			TimeUpdate::Omit => {}
			TimeUpdate::Now => *field = now_timestamp(),
			TimeUpdate::Set(v) => *field = v,
		}
	}
}

pub struct NameOps {
	max_nlinks: u16,
}

impl NameOps {
	pub fn new(max_nlinks: u16) -> Self {
		NameOps { max_nlinks }
	}

	/// Allocates a fresh inode, stamps it with `mode`/`uid`/`gid`/times, and
	/// links it into `parent_ino` as `name`. Rolls back the inode allocation
	/// if the directory insert fails.
	pub fn create_file<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		istore: &InodeStore,
		dt: &DirTable,
		fio: &FileIo,
		zmap: &ZoneMapper,
		inode_bitmap: &mut BitmapAllocator,
		zone_bitmap: &mut BitmapAllocator,
		parent_ino: u32,
		name: &str,
		mode: u16,
		uid: u16,
		gid: u16,
	) -> Result<u32> {
		validate_name(name)?;
		let mut parent = istore.read(store, parent_ino)?;
		if !parent.is_dir() {
			return Err(Error::new(ErrorKind::NotDirectory));
		}
		if dt.find(store, fio, zmap, zone_bitmap, &parent, name)?.is_some() {
			return Err(Error::new(ErrorKind::FileNameExists));
		}

		let new_ino = inode_bitmap.allocate()?;
		let now = now_timestamp();
		let mut inode = Inode::default();
		inode.mode = mode;
		inode.nlinks = 1;
		inode.uid = uid;
		inode.gid = gid;
		inode.atime = now;
		inode.mtime = now;
		inode.ctime = now;
		istore.write(store, new_ino, &inode)?;

		match dt.add_entry(store, fio, zmap, zone_bitmap, parent_ino, &mut parent, new_ino, name) {
			Ok(_) => {
				istore.write(store, parent_ino, &parent)?;
				Ok(new_ino)
			}
			Err(e) => {
				let _ = istore.clear(store, new_ino);
				let _ = inode_bitmap.free(new_ino);
				Err(e)
			}
		}
	}

	/// Adds a second name for an existing inode. Refuses directories (hard
	/// links to directories would make the tree a graph) and inodes already
	/// at the maximum link count.
	pub fn link_file<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		istore: &InodeStore,
		dt: &DirTable,
		fio: &FileIo,
		zmap: &ZoneMapper,
		zone_bitmap: &mut BitmapAllocator,
		parent_ino: u32,
		name: &str,
		target_ino: u32,
	) -> Result<()> {
		validate_name(name)?;
		let mut parent = istore.read(store, parent_ino)?;
		if !parent.is_dir() {
			return Err(Error::new(ErrorKind::NotDirectory));
		}
		if dt.find(store, fio, zmap, zone_bitmap, &parent, name)?.is_some() {
			return Err(Error::new(ErrorKind::FileNameExists));
		}

		let mut target = istore.read(store, target_ino)?;
		if target.is_dir() {
			return Err(Error::new(ErrorKind::LinkDirectory));
		}
		if target.nlinks >= self.max_nlinks {
			return Err(Error::new(ErrorKind::TooManyLinks));
		}

		target.nlinks += 1;
		istore.write(store, target_ino, &target)?;

		match dt.add_entry(store, fio, zmap, zone_bitmap, parent_ino, &mut parent, target_ino, name) {
			Ok(_) => {
				istore.write(store, parent_ino, &parent)?;
				Ok(())
			}
			Err(e) => {
				target.nlinks -= 1;
				let _ = istore.write(store, target_ino, &target);
				Err(e)
			}
		}
	}

	/// Removes the entry at `index` in `parent_ino`'s directory and decrements
	/// the target inode's link count. If that drops it to zero and nothing
	/// has it open, the inode is truncated to zero length and its bitmap bit
	/// freed immediately.
	pub fn unlink_file<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		istore: &InodeStore,
		dt: &DirTable,
		fio: &FileIo,
		zmap: &ZoneMapper,
		inode_bitmap: &mut BitmapAllocator,
		zone_bitmap: &mut BitmapAllocator,
		open_table: &OpenTable,
		parent_ino: u32,
		index: u32,
	) -> Result<()> {
		let mut parent = istore.read(store, parent_ino)?;
		if !parent.is_dir() {
			return Err(Error::new(ErrorKind::NotDirectory));
		}
		let entry = dt.entry_at(store, fio, zmap, zone_bitmap, &parent, index)?.ok_or(Error::new(ErrorKind::FileNotFound))?;
		let ino = entry.ino;

		dt.remove_entry(store, fio, zmap, zone_bitmap, parent_ino, &mut parent, index)?;
		istore.write(store, parent_ino, &parent)?;

		let mut inode = istore.read(store, ino)?;
		inode.nlinks = inode.nlinks.saturating_sub(1);
		istore.write(store, ino, &inode)?;

		if inode.nlinks == 0 && open_table.is_empty(ino) {
			fio.truncate(store, zmap, zone_bitmap, &mut inode, 0)?;
			istore.clear(store, ino)?;
			inode_bitmap.free(ino)?;
		}
		Ok(())
	}

	/// Creates a directory, then links `.` to itself and `..` to `parent_ino`.
	pub fn mkdir<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		istore: &InodeStore,
		dt: &DirTable,
		fio: &FileIo,
		zmap: &ZoneMapper,
		inode_bitmap: &mut BitmapAllocator,
		zone_bitmap: &mut BitmapAllocator,
		parent_ino: u32,
		name: &str,
		mode: u16,
		uid: u16,
		gid: u16,
	) -> Result<u32> {
		let new_ino = self.create_file(
			store,
			istore,
			dt,
			fio,
			zmap,
			inode_bitmap,
			zone_bitmap,
			parent_ino,
			name,
			S_IFDIR | (mode & !S_IFMT),
			uid,
			gid,
		)?;
		self.link_file(store, istore, dt, fio, zmap, zone_bitmap, new_ino, ".", new_ino)?;
		self.link_file(store, istore, dt, fio, zmap, zone_bitmap, new_ino, "..", parent_ino)?;
		Ok(new_ino)
	}

	/// Removes an empty, non-root directory named `name` from `parent_ino`.
	pub fn rmdir<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		istore: &InodeStore,
		dt: &DirTable,
		fio: &FileIo,
		zmap: &ZoneMapper,
		inode_bitmap: &mut BitmapAllocator,
		zone_bitmap: &mut BitmapAllocator,
		open_table: &OpenTable,
		parent_ino: u32,
		name: &str,
	) -> Result<()> {
		let parent = istore.read(store, parent_ino)?;
		if !parent.is_dir() {
			return Err(Error::new(ErrorKind::NotDirectory));
		}
		let entry = dt.find(store, fio, zmap, zone_bitmap, &parent, name)?.ok_or(Error::new(ErrorKind::FileNotFound))?;
		let dir_ino = entry.ino;
		if dir_ino == ROOT_INODE {
			return Err(Error::new(ErrorKind::DeleteRootDir));
		}
		let dir_inode = istore.read(store, dir_ino)?;
		if !dir_inode.is_dir() {
			return Err(Error::new(ErrorKind::NotDirectory));
		}
		if !dt.is_empty(store, fio, zmap, zone_bitmap, &dir_inode)? {
			return Err(Error::new(ErrorKind::DirectoryNotEmpty));
		}

		let self_idx = dt.find(store, fio, zmap, zone_bitmap, &dir_inode, ".")?.ok_or(Error::new(ErrorKind::FsBroken))?.index;
		let parent_idx = dt.find(store, fio, zmap, zone_bitmap, &dir_inode, "..")?.ok_or(Error::new(ErrorKind::FsBroken))?.index;

		self.unlink_file(store, istore, dt, fio, zmap, inode_bitmap, zone_bitmap, open_table, dir_ino, self_idx)?;
		self.unlink_file(store, istore, dt, fio, zmap, inode_bitmap, zone_bitmap, open_table, dir_ino, parent_idx)?;
		self.unlink_file(store, istore, dt, fio, zmap, inode_bitmap, zone_bitmap, open_table, parent_ino, entry.index)
	}

	/// Creates a symlink inode whose contents are the target path string.
	pub fn create_symlink<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		istore: &InodeStore,
		dt: &DirTable,
		fio: &FileIo,
		zmap: &ZoneMapper,
		inode_bitmap: &mut BitmapAllocator,
		zone_bitmap: &mut BitmapAllocator,
		parent_ino: u32,
		name: &str,
		target: &str,
		uid: u16,
		gid: u16,
	) -> Result<u32> {
		if target.is_empty() {
			return Err(Error::new(ErrorKind::LinkEmpty));
		}
		if target.len() > MAX_SYMLINK_LEN {
			return Err(Error::new(ErrorKind::LinkTooLong));
		}
		let new_ino = self.create_file(
			store,
			istore,
			dt,
			fio,
			zmap,
			inode_bitmap,
			zone_bitmap,
			parent_ino,
			name,
			S_IFLNK | 0o777,
			uid,
			gid,
		)?;
		let mut inode = istore.read(store, new_ino)?;
		fio.write(store, zmap, zone_bitmap, &mut inode, target.as_bytes(), 0)?;
		istore.write(store, new_ino, &inode)?;
		Ok(new_ino)
	}

	/// Reads a symlink's target string.
	pub fn read_link<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		istore: &InodeStore,
		fio: &FileIo,
		zmap: &ZoneMapper,
		zone_bitmap: &mut BitmapAllocator,
		ino: u32,
	) -> Result<String> {
		let inode = istore.read(store, ino)?;
		if !inode.is_symlink() {
			return Err(Error::new(ErrorKind::NotSymlink));
		}
		if inode.size as usize > MAX_SYMLINK_LEN {
			return Err(Error::new(ErrorKind::LinkTooLong));
		}
		let mut buf = vec![0u8; inode.size as usize];
		fio.read(store, zmap, zone_bitmap, &inode, &mut buf, 0)?;
		String::from_utf8(buf).map_err(|_| Error::new(ErrorKind::FsBroken))
	}

	pub fn chmod<D: Device>(&self, store: &mut BlockStore<D>, istore: &InodeStore, ino: u32, mode: u16) -> Result<()> {
		let mut inode = istore.read(store, ino)?;
		inode.mode = (inode.mode & S_IFMT) | (mode & !S_IFMT);
		inode.ctime = now_timestamp();
		istore.write(store, ino, &inode)
	}

	pub fn chown<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		istore: &InodeStore,
		ino: u32,
		uid: Option<u16>,
		gid: Option<u16>,
	) -> Result<()> {
		let mut inode = istore.read(store, ino)?;
		if let Some(u) = uid {
			inode.uid = u;
		}
		if let Some(g) = gid {
			inode.gid = g;
		}
		inode.ctime = now_timestamp();
		istore.write(store, ino, &inode)
	}

	pub fn utimens<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		istore: &InodeStore,
		ino: u32,
		atime: TimeUpdate,
		mtime: TimeUpdate,
	) -> Result<()> {
		let mut inode = istore.read(store, ino)?;
		atime.apply(&mut inode.atime);
		mtime.apply(&mut inode.mtime);
		inode.ctime = now_timestamp();
		istore.write(store, ino, &inode)
	}

	/// Moves/renames `src_name` under `src_parent_ino` to `dst_name` under
	/// `dst_parent_ino`. Mirrors the original's approach of temporarily
	/// bumping the moved inode's link count to keep it alive across the
	/// unlink/relink sequence, reusing the destination's directory slot in
	/// place when it already exists.
	#[allow(clippy::too_many_arguments)]
	pub fn rename<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		istore: &InodeStore,
		dt: &DirTable,
		fio: &FileIo,
		zmap: &ZoneMapper,
		resolver: &PathResolver,
		inode_bitmap: &mut BitmapAllocator,
		zone_bitmap: &mut BitmapAllocator,
		open_table: &OpenTable,
		src_parent_ino: u32,
		src_name: &str,
		dst_parent_ino: u32,
		dst_name: &str,
		fail_if_dst_exists: bool,
	) -> Result<()> {
		validate_name(dst_name)?;
		let src_parent = istore.read(store, src_parent_ino)?;
		let dst_parent = istore.read(store, dst_parent_ino)?;
		if !src_parent.is_dir() || !dst_parent.is_dir() {
			return Err(Error::new(ErrorKind::NotDirectory));
		}

		let src_entry =
			dt.find(store, fio, zmap, zone_bitmap, &src_parent, src_name)?.ok_or(Error::new(ErrorKind::FileNotFound))?;
		let dst_entry = dt.find(store, fio, zmap, zone_bitmap, &dst_parent, dst_name)?;
		if dst_entry.is_some() && fail_if_dst_exists {
			return Err(Error::new(ErrorKind::FileNameExists));
		}

		let src_ino = src_entry.ino;
		let mut src_inode = istore.read(store, src_ino)?;

		if src_inode.is_dir()
			&& resolver.is_ancestor(store, istore, fio, zmap, zone_bitmap, dt, src_ino, dst_parent_ino)?
		{
			return Err(Error::new(ErrorKind::MoveToSubdir));
		}

		if let Some(dst) = &dst_entry {
			if dst.ino == src_ino {
				return Ok(());
			}
			let dst_inode = istore.read(store, dst.ino)?;
			if src_inode.is_dir() != dst_inode.is_dir() {
				return Err(Error::new(if src_inode.is_dir() {
					ErrorKind::NotDirectory
				} else {
					ErrorKind::NotRegularFile
				}));
			}
			if src_inode.is_dir() && !dt.is_empty(store, fio, zmap, zone_bitmap, &dst_inode)? {
				return Err(Error::new(ErrorKind::DirectoryNotEmpty));
			}
		}

		// Keep the moved inode alive across the unlink/relink sequence below.
		src_inode.nlinks += 1;
		istore.write(store, src_ino, &src_inode)?;

		if src_inode.is_dir() {
			let current = istore.read(store, src_ino)?;
			let old_parent_idx =
				dt.find(store, fio, zmap, zone_bitmap, &current, "..")?.ok_or(Error::new(ErrorKind::FsBroken))?.index;
			self.unlink_file(store, istore, dt, fio, zmap, inode_bitmap, zone_bitmap, open_table, src_ino, old_parent_idx)?;
			self.link_file(store, istore, dt, fio, zmap, zone_bitmap, src_ino, "..", dst_parent_ino)?;
		}

		if let Some(dst) = dst_entry {
			if src_inode.is_dir() {
				self.rmdir(store, istore, dt, fio, zmap, inode_bitmap, zone_bitmap, open_table, dst_parent_ino, dst_name)?;
			} else {
				self.unlink_file(store, istore, dt, fio, zmap, inode_bitmap, zone_bitmap, open_table, dst_parent_ino, dst.index)?;
			}
			let mut dst_parent_after = istore.read(store, dst_parent_ino)?;
			dt.add_entry(store, fio, zmap, zone_bitmap, dst_parent_ino, &mut dst_parent_after, src_ino, dst_name)?;
			istore.write(store, dst_parent_ino, &dst_parent_after)?;
		} else {
			let mut dst_parent_after = istore.read(store, dst_parent_ino)?;
			dt.add_entry(store, fio, zmap, zone_bitmap, dst_parent_ino, &mut dst_parent_after, src_ino, dst_name)?;
			istore.write(store, dst_parent_ino, &dst_parent_after)?;
		}

		let src_parent_after = istore.read(store, src_parent_ino)?;
		let src_idx_now =
			dt.find(store, fio, zmap, zone_bitmap, &src_parent_after, src_name)?.ok_or(Error::new(ErrorKind::FsBroken))?.index;
		self.unlink_file(store, istore, dt, fio, zmap, inode_bitmap, zone_bitmap, open_table, src_parent_ino, src_idx_now)
	}
}
