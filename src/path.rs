//! Path-to-inode resolution, including symlink expansion.
//!
//! Grounded on the original `PathResolver.cpp`'s `resolvePath`: same
//! component-by-component directory lookup, same "only expand the last
//! component's symlink if asked" behavior, same depth guard. The original
//! threads a single depth counter through recursive symlink expansion via a
//! member field; this crate threads an explicit `&mut u32` instead, which
//! reads the same but doesn't need interior mutability.

use crate::bitmap::BitmapAllocator;
use crate::block_store::{BlockStore, Device};
use crate::consts::*;
use crate::dir::DirTable;
use crate::error::{Error, ErrorKind, Result};
use crate::file_io::FileIo;
use crate::inode::InodeStore;
use crate::zone_mapper::ZoneMapper;

pub struct PathResolver {
	max_depth: u32,
}

impl PathResolver {
	pub fn new(max_depth: u32) -> Self {
		PathResolver { max_depth }
	}

	fn split(path: &str) -> Vec<&str> {
		path.split('/').filter(|c| !c.is_empty()).collect()
	}

	/// Resolves `path` against `base_ino` (used as the starting directory
	/// for a relative path; an absolute path always starts at the root
	/// inode). `resolve_last_symlink` controls whether the final
	/// component, if it names a symlink, is itself expanded.
	pub fn resolve<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		inode_store: &InodeStore,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir_table: &DirTable,
		path: &str,
		base_ino: u32,
		resolve_last_symlink: bool,
	) -> Result<u32> {
		let start = if path.starts_with('/') { ROOT_INODE } else { base_ino };
		let mut depth = 0u32;
		self.resolve_with_depth(
			store,
			inode_store,
			file_io,
			zone_mapper,
			bitmap,
			dir_table,
			path,
			start,
			resolve_last_symlink,
			&mut depth,
		)
	}

	fn resolve_with_depth<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		inode_store: &InodeStore,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir_table: &DirTable,
		path: &str,
		base_ino: u32,
		resolve_last_symlink: bool,
		depth: &mut u32,
	) -> Result<u32> {
		let components = Self::split(path);
		let mut current = base_ino;
		let mut parent = base_ino;

		for (i, component) in components.iter().enumerate() {
			if *depth >= self.max_depth {
				return Err(Error::new(ErrorKind::PathTooDeep));
			}
			*depth += 1;

			let parent_inode = inode_store.read(store, current)?;
			if !parent_inode.is_dir() {
				return Err(Error::new(ErrorKind::NotDirectory));
			}
			let found = dir_table.find(store, file_io, zone_mapper, bitmap, &parent_inode, component)?;
			current = match found {
				Some(e) => e.ino,
				None => return Err(Error::new(ErrorKind::FileNotFound)),
			};

			let is_last = i == components.len() - 1;
			if is_last && !resolve_last_symlink {
				break;
			}

			let inode = inode_store.read(store, current)?;
			if inode.is_symlink() {
				let mut buf = vec![0u8; inode.size as usize];
				let n = file_io.read(store, zone_mapper, bitmap, &inode, &mut buf, 0)?;
				let target = std::str::from_utf8(&buf[..n])
					.map_err(|_| Error::new(ErrorKind::FsBroken))?
					.to_string();
				if target.is_empty() {
					return Err(Error::new(ErrorKind::LinkEmpty));
				}
				let next_base = if target.starts_with('/') { ROOT_INODE } else { parent };
				current = self.resolve_with_depth(
					store,
					inode_store,
					file_io,
					zone_mapper,
					bitmap,
					dir_table,
					&target,
					next_base,
					resolve_last_symlink,
					depth,
				)?;
			}
			parent = current;
		}

		Ok(current)
	}

	/// Walks `start_ino` up through `..` entries, returning whether
	/// `candidate_ancestor` is ever reached before the root. Used by rename
	/// to refuse moving a directory into its own subtree.
	pub fn is_ancestor<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		inode_store: &InodeStore,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir_table: &DirTable,
		candidate_ancestor: u32,
		start_ino: u32,
	) -> Result<bool> {
		let mut current = start_ino;
		for _ in 0..self.max_depth {
			if current == candidate_ancestor {
				return Ok(true);
			}
			if current == ROOT_INODE {
				return Ok(false);
			}
			let inode = inode_store.read(store, current)?;
			if !inode.is_dir() {
				return Err(Error::new(ErrorKind::NotDirectory));
			}
			let parent_entry = dir_table.find(store, file_io, zone_mapper, bitmap, &inode, "..")?;
			current = match parent_entry {
				Some(e) => e.ino,
				None => return Err(Error::new(ErrorKind::FsBroken)),
			};
		}
		Err(Error::new(ErrorKind::PathTooDeep))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::inode::{now_timestamp, Inode};
	use crate::layout::{Layout, Superblock};
	use std::io::Cursor;

	struct Harness {
		bs: BlockStore<Cursor<Vec<u8>>>,
		bmap: BitmapAllocator,
		zmap: ZoneMapper,
		fio: FileIo,
		dt: DirTable,
		istore: InodeStore,
		resolver: PathResolver,
		next_ino: u32,
	}

	impl Harness {
		fn new() -> Self {
			let block_size = 1024u32;
			let zones = 4096u32;
			let zmap_blocks = (zones + block_size * 8 - 1) / (block_size * 8);
			let ninodes = 64u32;
			let imap_blocks = (ninodes + 1 + block_size * 8 - 1) / (block_size * 8);
			let inode_start = IMAP_START_BLOCK + imap_blocks + zmap_blocks;
			let inodes_per_block = block_size / INODE_SIZE as u32;
			let inode_table_blocks = (ninodes + inodes_per_block - 1) / inodes_per_block;
			let data_start_block = inode_start + inode_table_blocks;
			let first_data_zone = data_start_block;

			let sb = Superblock {
				ninodes,
				imap_blocks,
				zmap_blocks,
				first_data_zone,
				log_zone_size: 0,
				max_size: u32::MAX,
				zones,
				magic: MAGIC,
				block_size,
				disk_version: 3,
			};
			let layout = Layout::from_superblock(&sb).unwrap();
			let total_blocks = first_data_zone + zones;
			let mut bs = BlockStore::new(Cursor::new(vec![0u8; (total_blocks * block_size) as usize]));
			bs.set_geometry(block_size, layout.blocks_per_zone);
			let bmap = BitmapAllocator::load(
				&mut bs,
				layout.zmap_start,
				block_size,
				layout.total_zones,
				layout.first_data_zone,
			)
			.unwrap();
			Harness {
				bs,
				bmap,
				zmap: ZoneMapper::new(layout, true),
				fio: FileIo::new(layout),
				dt: DirTable::new(layout),
				istore: InodeStore::new(layout),
				resolver: PathResolver::new(MAX_PATH_DEPTH),
				next_ino: ROOT_INODE,
			}
		}

		fn alloc_ino(&mut self) -> u32 {
			let ino = self.next_ino;
			self.next_ino += 1;
			ino
		}

		fn mkdir(&mut self, ino: u32, parent: u32) {
			let mut dir = Inode::default();
			dir.mode = S_IFDIR | 0o755;
			dir.nlinks = 2;
			let now = now_timestamp();
			dir.atime = now;
			dir.mtime = now;
			dir.ctime = now;
			self.dt.add_entry(&mut self.bs, &self.fio, &self.zmap, &mut self.bmap, ino, &mut dir, ino, ".").unwrap();
			self.dt
				.add_entry(&mut self.bs, &self.fio, &self.zmap, &mut self.bmap, ino, &mut dir, parent, "..")
				.unwrap();
			self.istore.write(&mut self.bs, ino, &dir).unwrap();
		}

		fn link_child(&mut self, parent: u32, name: &str, child: u32) {
			let mut dir = self.istore.read(&mut self.bs, parent).unwrap();
			self.dt
				.add_entry(&mut self.bs, &self.fio, &self.zmap, &mut self.bmap, parent, &mut dir, child, name)
				.unwrap();
			self.istore.write(&mut self.bs, parent, &dir).unwrap();
		}

		fn mk_symlink(&mut self, ino: u32, target: &str) {
			let mut link = Inode::default();
			link.mode = S_IFLNK | 0o777;
			link.nlinks = 1;
			self.fio.write(&mut self.bs, &self.zmap, &mut self.bmap, &mut link, target.as_bytes(), 0).unwrap();
			self.istore.write(&mut self.bs, ino, &link).unwrap();
		}

		fn resolve(&mut self, path: &str, base: u32) -> Result<u32> {
			self.resolver.resolve(
				&mut self.bs,
				&self.istore,
				&self.fio,
				&self.zmap,
				&mut self.bmap,
				&self.dt,
				path,
				base,
				true,
			)
		}
	}

	#[test]
	fn resolves_nested_path_from_root() {
		let mut h = Harness::new();
		h.mkdir(ROOT_INODE, ROOT_INODE);
		let sub = h.alloc_ino();
		h.mkdir(sub, ROOT_INODE);
		h.link_child(ROOT_INODE, "sub", sub);

		let found = h.resolve("/sub", ROOT_INODE).unwrap();
		assert_eq!(found, sub);
	}

	#[test]
	fn missing_component_is_file_not_found() {
		let mut h = Harness::new();
		h.mkdir(ROOT_INODE, ROOT_INODE);
		assert_eq!(h.resolve("/nope", ROOT_INODE).unwrap_err().kind(), ErrorKind::FileNotFound);
	}

	#[test]
	fn symlink_is_expanded_by_default() {
		let mut h = Harness::new();
		h.mkdir(ROOT_INODE, ROOT_INODE);
		let target_dir = h.alloc_ino();
		h.mkdir(target_dir, ROOT_INODE);
		h.link_child(ROOT_INODE, "real", target_dir);
		let link_ino = h.alloc_ino();
		h.mk_symlink(link_ino, "/real");
		h.link_child(ROOT_INODE, "link", link_ino);

		let resolved = h.resolve("/link", ROOT_INODE).unwrap();
		assert_eq!(resolved, target_dir);
	}

	#[test]
	fn is_ancestor_detects_self_and_parent() {
		let mut h = Harness::new();
		h.mkdir(ROOT_INODE, ROOT_INODE);
		let child = h.alloc_ino();
		h.mkdir(child, ROOT_INODE);
		h.link_child(ROOT_INODE, "child", child);

		assert!(h
			.resolver
			.is_ancestor(&mut h.bs, &h.istore, &h.fio, &h.zmap, &mut h.bmap, &h.dt, ROOT_INODE, child)
			.unwrap());
		assert!(!h
			.resolver
			.is_ancestor(&mut h.bs, &h.istore, &h.fio, &h.zmap, &mut h.bmap, &h.dt, child, ROOT_INODE)
			.unwrap());
	}
}
