//! The 64-byte on-disk inode record and the store that reads/writes it by
//! inode number.
//!
//! Grounded on the original `Inode.h` for the field layout (10 zone slots,
//! no separate indirect-count field) and `mkfs/src/ext2.rs`'s `INode`
//! packed-struct-plus-`get_disk_offset` idiom.

use std::mem::size_of;
use std::slice;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::block_store::{BlockStore, Device};
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::layout::Layout;

/// Raw, exactly-64-byte on-disk inode record.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct InodeRaw {
	mode: u16,
	nlinks: u16,
	uid: u16,
	gid: u16,
	size: u32,
	atime: u32,
	mtime: u32,
	ctime: u32,
	zone: [u32; ZONE_SLOTS],
}

/// A safely-referenceable copy of an inode's fields.
#[derive(Clone, Copy, Debug, Default)]
pub struct Inode {
	pub mode: u16,
	pub nlinks: u16,
	pub uid: u16,
	pub gid: u16,
	pub size: u32,
	pub atime: u32,
	pub mtime: u32,
	pub ctime: u32,
	pub zone: [u32; ZONE_SLOTS],
}

impl Inode {
	pub fn file_type(&self) -> u16 {
		self.mode & S_IFMT
	}

	pub fn is_dir(&self) -> bool {
		self.file_type() == S_IFDIR
	}

	pub fn is_regular(&self) -> bool {
		self.file_type() == S_IFREG
	}

	pub fn is_symlink(&self) -> bool {
		self.file_type() == S_IFLNK
	}

	fn to_raw(self) -> InodeRaw {
		InodeRaw {
			mode: self.mode,
			nlinks: self.nlinks,
			uid: self.uid,
			gid: self.gid,
			size: self.size,
			atime: self.atime,
			mtime: self.mtime,
			ctime: self.ctime,
			zone: self.zone,
		}
	}

	fn from_raw(raw: InodeRaw) -> Self {
		Inode {
			mode: raw.mode,
			nlinks: raw.nlinks,
			uid: raw.uid,
			gid: raw.gid,
			size: raw.size,
			atime: raw.atime,
			mtime: raw.mtime,
			ctime: raw.ctime,
			zone: raw.zone,
		}
	}
}

/// The attributes a `getattr`-shaped call returns, and what a directory
/// listing carries per entry alongside its name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attrs {
	pub ino: u32,
	pub mode: u16,
	pub nlinks: u16,
	pub uid: u16,
	pub gid: u16,
	pub size: u32,
	pub atime: u32,
	pub mtime: u32,
	pub ctime: u32,
	pub blocks: u64,
	pub rdev: u32,
}

impl Attrs {
	pub fn from_inode(ino: u32, inode: &Inode, block_size: u32) -> Self {
		let block_size = block_size as u64;
		let blocks = (inode.size as u64 + block_size - 1) / block_size;
		Attrs {
			ino,
			mode: inode.mode,
			nlinks: inode.nlinks,
			uid: inode.uid,
			gid: inode.gid,
			size: inode.size,
			atime: inode.atime,
			mtime: inode.mtime,
			ctime: inode.ctime,
			blocks,
			rdev: 0,
		}
	}
}

/// Current time as a MINIX-style 32-bit unix timestamp. Clamps to `u32::MAX`
/// rather than panicking should the host clock ever be set beyond 2106.
pub fn now_timestamp() -> u32 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs().min(u32::MAX as u64) as u32)
		.unwrap_or(0)
}

/// Reads and writes 64-byte inode records by inode number.
pub struct InodeStore {
	layout: Layout,
}

impl InodeStore {
	pub fn new(layout: Layout) -> Self {
		InodeStore { layout }
	}

	pub fn read<D: Device>(&self, store: &mut BlockStore<D>, ino: u32) -> Result<Inode> {
		let (block, offset) = self.layout.inode_offset(ino)?;
		let mut block_buf = vec![0u8; self.layout.block_size as usize];
		store.read_block(block, &mut block_buf)?;

		let mut raw: InodeRaw = unsafe { std::mem::zeroed() };
		let raw_bytes =
			unsafe { slice::from_raw_parts_mut(&mut raw as *mut _ as *mut u8, size_of::<InodeRaw>()) };
		raw_bytes.copy_from_slice(&block_buf[offset as usize..offset as usize + INODE_SIZE]);

		Ok(Inode::from_raw(raw))
	}

	pub fn write<D: Device>(&self, store: &mut BlockStore<D>, ino: u32, inode: &Inode) -> Result<()> {
		let (block, offset) = self.layout.inode_offset(ino)?;
		let mut block_buf = vec![0u8; self.layout.block_size as usize];
		store.read_block(block, &mut block_buf)?;

		let raw = inode.to_raw();
		let raw_bytes =
			unsafe { slice::from_raw_parts(&raw as *const _ as *const u8, size_of::<InodeRaw>()) };
		block_buf[offset as usize..offset as usize + INODE_SIZE].copy_from_slice(raw_bytes);

		store.write_block(block, &block_buf)
	}

	/// Zeroes out an inode's on-disk record; used when reaping an orphan.
	pub fn clear<D: Device>(&self, store: &mut BlockStore<D>, ino: u32) -> Result<()> {
		self.write(store, ino, &Inode::default())
	}
}

const _: () = assert!(size_of::<InodeRaw>() == INODE_SIZE);
