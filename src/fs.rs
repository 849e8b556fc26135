//! Public facade: mounts a device, wires every component together, and
//! exposes the path-based POSIX-shaped API a host bridge would call.
//!
//! Grounded on the original `FS.cpp`/`FS.h` for component wiring order at
//! mount, and the teacher's `main.rs` "open device, validate, fail loud"
//! shape for what a top-level entry point into this lineage's on-disk
//! format looks like.

use crate::bitmap::BitmapAllocator;
use crate::block_store::{BlockStore, Device};
use crate::consts::*;
use crate::dir::{DirEntryAttrs, DirTable};
use crate::error::{Error, ErrorKind, Result};
use crate::file_io::FileIo;
use crate::inode::{Attrs, InodeStore};
use crate::layout::{Layout, Superblock};
use crate::name_ops::{NameOps, TimeUpdate};
use crate::open_table::OpenTable;
use crate::path::PathResolver;
use crate::tx::TxManager;
use crate::zone_mapper::ZoneMapper;

/// Mount-time configuration. No config file is read; this mirrors the rest
/// of the lineage's "plain struct off the call site" shape.
#[derive(Clone, Copy, Debug)]
pub struct MountOptions {
	pub read_only: bool,
	pub max_path_depth: u32,
	pub zero_init_new_zones: bool,
}

impl Default for MountOptions {
	fn default() -> Self {
		MountOptions { read_only: false, max_path_depth: MAX_PATH_DEPTH, zero_init_new_zones: true }
	}
}

/// `open`'s `O_TRUNC`-equivalent.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenFlags {
	pub truncate: bool,
}

/// Coarse space/inode accounting, as a host `statvfs` call would want.
#[derive(Clone, Copy, Debug)]
pub struct StatFs {
	pub block_size: u32,
	pub total_data_blocks: u32,
	pub free_data_blocks: u32,
	pub total_inodes: u32,
	pub free_inodes: u32,
	pub name_max: u32,
}

/// Either `uid`/`gid` alone (`chown`) or `atime`/`mtime` (`utimens`) may be
/// left untouched by the caller.
#[derive(Clone, Copy, Debug, Default)]
pub struct OwnerUpdate {
	pub uid: Option<u16>,
	pub gid: Option<u16>,
}

/// `list_dir`/`read`/`write`/`truncate` may be addressed either by path or by
/// an inode already returned from `open`/`create`/`mkdir` — the latter stays
/// valid even after the last link to the file has been removed.
pub enum Handle<'a> {
	Path(&'a str),
	Ino(u32),
}

impl<'a> From<&'a str> for Handle<'a> {
	fn from(path: &'a str) -> Self {
		Handle::Path(path)
	}
}

impl<'a> From<u32> for Handle<'a> {
	fn from(ino: u32) -> Self {
		Handle::Ino(ino)
	}
}

pub struct Fs<D: Device> {
	store: BlockStore<D>,
	layout: Layout,
	inode_bitmap: BitmapAllocator,
	zone_bitmap: BitmapAllocator,
	istore: InodeStore,
	dt: DirTable,
	fio: FileIo,
	zmap: ZoneMapper,
	resolver: PathResolver,
	name_ops: NameOps,
	open_table: OpenTable,
	tx_manager: TxManager,
	read_only: bool,
}

impl<D: Device> Fs<D> {
	/// Reads and validates the superblock, derives the layout, loads both
	/// bitmaps, and wires every component together.
	pub fn mount(device: D, options: MountOptions) -> Result<Self> {
		let mut store = BlockStore::new(device);
		let sb = Superblock::read(&mut store)?;
		let layout = Layout::from_superblock(&sb)?;
		store.set_geometry(layout.block_size, layout.blocks_per_zone);

		let inode_bitmap =
			BitmapAllocator::load(&mut store, layout.imap_start, layout.block_size, layout.total_inodes + 1, ROOT_INODE)?;
		let zone_bitmap = BitmapAllocator::load(
			&mut store,
			layout.zmap_start,
			layout.block_size,
			layout.total_zones,
			layout.first_data_zone,
		)?;

		log::debug!(
			"mounted minix image: {} inodes, {} zones, block_size={}, read_only={}",
			layout.total_inodes,
			layout.total_zones,
			layout.block_size,
			options.read_only
		);

		Ok(Fs {
			store,
			layout,
			inode_bitmap,
			zone_bitmap,
			istore: InodeStore::new(layout),
			dt: DirTable::new(layout),
			fio: FileIo::new(layout),
			zmap: ZoneMapper::new(layout, options.zero_init_new_zones),
			resolver: PathResolver::new(options.max_path_depth),
			name_ops: NameOps::new(MAX_NLINKS),
			open_table: OpenTable::new(),
			tx_manager: TxManager::new(),
			read_only: options.read_only,
		})
	}

	/// Flushes both bitmaps and closes the underlying device, returning it.
	pub fn unmount(mut self) -> Result<D> {
		self.inode_bitmap.sync(&mut self.store)?;
		self.zone_bitmap.sync(&mut self.store)?;
		log::debug!("unmounted minix image");
		self.store.close()
	}

	fn require_writable(&self) -> Result<()> {
		if self.read_only {
			log::warn!("rejected mutation on a read-only mount");
			return Err(Error::new(ErrorKind::ReadOnlyFs));
		}
		Ok(())
	}

	fn resolve(&mut self, path: &str, resolve_last_symlink: bool) -> Result<u32> {
		self.resolver.resolve(
			&mut self.store,
			&self.istore,
			&self.fio,
			&self.zmap,
			&mut self.zone_bitmap,
			&self.dt,
			path,
			ROOT_INODE,
			resolve_last_symlink,
		)
	}

	/// Splits `path` into `(parent, name)`. `/` itself has no parent/name
	/// pair and is rejected.
	fn split_parent(path: &str) -> Result<(&str, &str)> {
		let trimmed = path.trim_end_matches('/');
		if trimmed.is_empty() {
			return Err(Error::new(ErrorKind::FileNotFound));
		}
		match trimmed.rfind('/') {
			Some(0) => Ok(("/", &trimmed[1..])),
			Some(idx) => Ok((&trimmed[..idx], &trimmed[idx + 1..])),
			None => Ok(("/", trimmed)),
		}
	}

	fn resolve_handle(&mut self, handle: Handle<'_>, resolve_last_symlink: bool) -> Result<u32> {
		match handle {
			Handle::Path(path) => self.resolve(path, resolve_last_symlink),
			Handle::Ino(ino) => Ok(ino),
		}
	}

	fn attrs_for(&mut self, ino: u32) -> Result<Attrs> {
		let inode = self.istore.read(&mut self.store, ino)?;
		Ok(Attrs::from_inode(ino, &inode, self.layout.block_size))
	}

	// -- read-only operations ------------------------------------------------

	pub fn get_attr(&mut self, path: &str) -> Result<Attrs> {
		let ino = self.resolve(path, true)?;
		self.attrs_for(ino)
	}

	pub fn list_dir<'a>(&mut self, handle: impl Into<Handle<'a>>) -> Result<Vec<DirEntryAttrs>> {
		let ino = self.resolve_handle(handle.into(), true)?;
		let inode = self.istore.read(&mut self.store, ino)?;
		self.dt.list_with_attrs(&mut self.store, &self.fio, &self.zmap, &mut self.zone_bitmap, &self.istore, &inode)
	}

	/// Like [`Fs::list_dir`] but returns only `count` entries starting at
	/// `offset` into the live-entry list, for callers paging a large
	/// directory rather than materialising it whole.
	pub fn list_dir_range<'a>(&mut self, handle: impl Into<Handle<'a>>, offset: usize, count: usize) -> Result<Vec<DirEntryAttrs>> {
		let all = self.list_dir(handle)?;
		Ok(all.into_iter().skip(offset).take(count).collect())
	}

	pub fn read<'a>(&mut self, handle: impl Into<Handle<'a>>, buf: &mut [u8], offset: u64) -> Result<usize> {
		let ino = self.resolve_handle(handle.into(), true)?;
		let inode = self.istore.read(&mut self.store, ino)?;
		self.fio.read(&mut self.store, &self.zmap, &mut self.zone_bitmap, &inode, buf, offset)
	}

	pub fn read_link(&mut self, path: &str) -> Result<String> {
		let ino = self.resolve(path, false)?;
		self.name_ops.read_link(&mut self.store, &self.istore, &self.fio, &self.zmap, &mut self.zone_bitmap, ino)
	}

	pub fn stat_fs(&self) -> StatFs {
		let total_data_blocks = self.layout.total_zones - self.layout.first_data_zone;
		let free_data_blocks = total_data_blocks - self.zone_bitmap.allocated_count();
		let total_inodes = self.layout.total_inodes;
		let free_inodes = total_inodes - self.inode_bitmap.allocated_count();
		StatFs {
			block_size: self.layout.block_size,
			total_data_blocks,
			free_data_blocks,
			total_inodes,
			free_inodes,
			name_max: DIRENT_NAME_MAX as u32,
		}
	}

	// -- open/close ------------------------------------------------------------

	pub fn open(&mut self, path: &str, flags: OpenFlags) -> Result<u32> {
		let ino = self.resolve(path, true)?;
		let inode = self.istore.read(&mut self.store, ino)?;
		if !inode.is_regular() {
			return Err(Error::new(ErrorKind::NotRegularFile));
		}
		if flags.truncate {
			self.truncate_ino(ino, 0)?;
		}
		self.open_table.add(ino);
		Ok(ino)
	}

	pub fn close(&mut self, ino: u32) -> Result<()> {
		self.open_table.remove(ino);
		let inode = self.istore.read(&mut self.store, ino)?;
		if inode.nlinks == 0 && self.open_table.is_empty(ino) {
			self.require_writable()?;
			let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
			let (store, imap, zone_bitmap) = guard.parts();
			let mut inode = self.istore.read(store, ino)?;
			self.fio.truncate(store, &self.zmap, zone_bitmap, &mut inode, 0)?;
			self.istore.clear(store, ino)?;
			imap.free(ino)?;
			guard.commit()?;
			log::debug!("reaped orphan inode {ino} at close");
		}
		Ok(())
	}

	// -- mutating operations -----------------------------------------------

	pub fn write<'a>(&mut self, handle: impl Into<Handle<'a>>, buf: &[u8], offset: u64) -> Result<usize> {
		self.require_writable()?;
		let ino = self.resolve_handle(handle.into(), true)?;
		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, _imap, zone_bitmap) = guard.parts();
		let mut inode = self.istore.read(store, ino)?;
		let n = self.fio.write(store, &self.zmap, zone_bitmap, &mut inode, buf, offset)?;
		self.istore.write(store, ino, &inode)?;
		guard.commit()?;
		Ok(n)
	}

	fn truncate_ino(&mut self, ino: u32, new_size: u64) -> Result<()> {
		self.require_writable()?;
		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, _imap, zone_bitmap) = guard.parts();
		let mut inode = self.istore.read(store, ino)?;
		self.fio.truncate(store, &self.zmap, zone_bitmap, &mut inode, new_size)?;
		self.istore.write(store, ino, &inode)?;
		guard.commit()
	}

	pub fn truncate<'a>(&mut self, handle: impl Into<Handle<'a>>, new_size: u64) -> Result<()> {
		let ino = self.resolve_handle(handle.into(), true)?;
		self.truncate_ino(ino, new_size)
	}

	pub fn create(&mut self, parent_path: &str, name: &str, mode: u16, uid: u16, gid: u16) -> Result<u32> {
		self.require_writable()?;
		let parent_ino = self.resolve(parent_path, true)?;
		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, imap, zone_bitmap) = guard.parts();
		let ino = self.name_ops.create_file(
			store,
			&self.istore,
			&self.dt,
			&self.fio,
			&self.zmap,
			imap,
			zone_bitmap,
			parent_ino,
			name,
			S_IFREG | (mode & !S_IFMT),
			uid,
			gid,
		)?;
		guard.commit()?;
		Ok(ino)
	}

	pub fn link(&mut self, existing_path: &str, new_path: &str) -> Result<()> {
		self.require_writable()?;
		let target_ino = self.resolve(existing_path, true)?;
		let (parent_path, name) = Self::split_parent(new_path)?;
		let parent_ino = self.resolve(parent_path, true)?;

		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, _imap, zone_bitmap) = guard.parts();
		self.name_ops.link_file(store, &self.istore, &self.dt, &self.fio, &self.zmap, zone_bitmap, parent_ino, name, target_ino)?;
		guard.commit()
	}

	pub fn unlink(&mut self, path: &str) -> Result<()> {
		self.require_writable()?;
		let (parent_path, name) = Self::split_parent(path)?;
		let parent_ino = self.resolve(parent_path, true)?;

		let parent = self.istore.read(&mut self.store, parent_ino)?;
		let entry = self
			.dt
			.find(&mut self.store, &self.fio, &self.zmap, &mut self.zone_bitmap, &parent, name)?
			.ok_or(Error::new(ErrorKind::FileNotFound))?;
		let target = self.istore.read(&mut self.store, entry.ino)?;
		if target.is_dir() {
			return Err(Error::new(ErrorKind::UnlinkDirectory));
		}

		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, imap, zone_bitmap) = guard.parts();
		self.name_ops.unlink_file(
			store,
			&self.istore,
			&self.dt,
			&self.fio,
			&self.zmap,
			imap,
			zone_bitmap,
			&self.open_table,
			parent_ino,
			entry.index,
		)?;
		guard.commit()
	}

	pub fn mkdir(&mut self, path: &str, mode: u16, uid: u16, gid: u16) -> Result<u32> {
		self.require_writable()?;
		let (parent_path, name) = Self::split_parent(path)?;
		let parent_ino = self.resolve(parent_path, true)?;

		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, imap, zone_bitmap) = guard.parts();
		let ino = self.name_ops.mkdir(
			store,
			&self.istore,
			&self.dt,
			&self.fio,
			&self.zmap,
			imap,
			zone_bitmap,
			parent_ino,
			name,
			mode,
			uid,
			gid,
		)?;
		guard.commit()?;
		Ok(ino)
	}

	pub fn rmdir(&mut self, path: &str) -> Result<()> {
		self.require_writable()?;
		let (parent_path, name) = Self::split_parent(path)?;
		let parent_ino = self.resolve(parent_path, true)?;

		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, imap, zone_bitmap) = guard.parts();
		self.name_ops.rmdir(
			store,
			&self.istore,
			&self.dt,
			&self.fio,
			&self.zmap,
			imap,
			zone_bitmap,
			&self.open_table,
			parent_ino,
			name,
		)?;
		guard.commit()
	}

	pub fn rename(&mut self, from: &str, to: &str, fail_if_exists: bool) -> Result<()> {
		self.require_writable()?;
		let (src_parent_path, src_name) = Self::split_parent(from)?;
		let (dst_parent_path, dst_name) = Self::split_parent(to)?;
		let src_parent_ino = self.resolve(src_parent_path, true)?;
		let dst_parent_ino = self.resolve(dst_parent_path, true)?;

		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, imap, zone_bitmap) = guard.parts();
		self.name_ops.rename(
			store,
			&self.istore,
			&self.dt,
			&self.fio,
			&self.zmap,
			&self.resolver,
			imap,
			zone_bitmap,
			&self.open_table,
			src_parent_ino,
			src_name,
			dst_parent_ino,
			dst_name,
			fail_if_exists,
		)?;
		guard.commit()
	}

	pub fn create_symlink(&mut self, path: &str, target: &str, uid: u16, gid: u16) -> Result<u32> {
		self.require_writable()?;
		let (parent_path, name) = Self::split_parent(path)?;
		let parent_ino = self.resolve(parent_path, true)?;

		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, imap, zone_bitmap) = guard.parts();
		let ino = self.name_ops.create_symlink(
			store,
			&self.istore,
			&self.dt,
			&self.fio,
			&self.zmap,
			imap,
			zone_bitmap,
			parent_ino,
			name,
			target,
			uid,
			gid,
		)?;
		guard.commit()?;
		Ok(ino)
	}

	pub fn chmod(&mut self, path: &str, mode: u16) -> Result<()> {
		self.require_writable()?;
		let ino = self.resolve(path, true)?;
		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, _imap, _zone_bitmap) = guard.parts();
		self.name_ops.chmod(store, &self.istore, ino, mode)?;
		guard.commit()
	}

	pub fn chown(&mut self, path: &str, owner: OwnerUpdate) -> Result<()> {
		self.require_writable()?;
		let ino = self.resolve(path, true)?;
		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, _imap, _zone_bitmap) = guard.parts();
		self.name_ops.chown(store, &self.istore, ino, owner.uid, owner.gid)?;
		guard.commit()
	}

	pub fn utimens(&mut self, path: &str, atime: TimeUpdate, mtime: TimeUpdate) -> Result<()> {
		self.require_writable()?;
		let ino = self.resolve(path, true)?;
		let mut guard = self.tx_manager.begin_tx(&mut self.store, &mut self.inode_bitmap, &mut self.zone_bitmap)?;
		let (store, _imap, _zone_bitmap) = guard.parts();
		self.name_ops.utimens(store, &self.istore, ino, atime, mtime)?;
		guard.commit()
	}
}
