//! Superblock parsing and the immutable, derived on-disk geometry.
//!
//! Grounded on `mkfs/src/ext2.rs`'s `Superblock`/`BlockGroupDescriptor`
//! packed-struct-plus-offset-arithmetic idiom (zeroed raw struct, read into
//! its raw byte representation, read fields back out through local copies to
//! avoid references into unaligned packed fields) and the original
//! `Superblock.h`/`Layout.h` for the MINIX-specific field layout.

use std::mem::size_of;
use std::slice;

use crate::block_store::{BlockStore, Device};
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};

/// Raw on-disk superblock record, exactly as it sits at byte 1024.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct SuperblockRaw {
	ninodes: u32,
	_pad0: u16,
	imap_blocks: u16,
	zmap_blocks: u16,
	first_data_zone: u16,
	log_zone_size: u16,
	_pad1: u16,
	max_size: u32,
	zones: u32,
	magic: u16,
	_pad2: u16,
	block_size: u16,
	disk_version: u8,
	_pad_end: u8,
}

/// The superblock fields, copied out of the packed on-disk record into
/// ordinary (safely-referenceable) fields.
#[derive(Clone, Copy, Debug)]
pub struct Superblock {
	pub ninodes: u32,
	pub imap_blocks: u32,
	pub zmap_blocks: u32,
	pub first_data_zone: u32,
	pub log_zone_size: u16,
	pub max_size: u32,
	pub zones: u32,
	pub magic: u16,
	pub block_size: u32,
	pub disk_version: u8,
}

impl Superblock {
	/// Reads and validates the superblock from byte offset 1024.
	pub fn read<D: Device>(store: &mut BlockStore<D>) -> Result<Self> {
		let mut raw: SuperblockRaw = unsafe { std::mem::zeroed() };
		let slice =
			unsafe { slice::from_raw_parts_mut(&mut raw as *mut _ as *mut u8, size_of::<SuperblockRaw>()) };
		store.read_bytes(SUPERBLOCK_OFFSET, slice)?;

		let sb = Superblock {
			ninodes: raw.ninodes,
			imap_blocks: raw.imap_blocks as u32,
			zmap_blocks: raw.zmap_blocks as u32,
			first_data_zone: raw.first_data_zone as u32,
			log_zone_size: raw.log_zone_size,
			max_size: raw.max_size,
			zones: raw.zones,
			magic: raw.magic,
			block_size: raw.block_size as u32,
			disk_version: raw.disk_version,
		};
		sb.validate()?;
		Ok(sb)
	}

	fn validate(&self) -> Result<()> {
		if self.magic != MAGIC {
			return Err(Error::new(ErrorKind::InvalidSuperblock));
		}
		if !VALID_BLOCK_SIZES.contains(&self.block_size) {
			return Err(Error::new(ErrorKind::InvalidSuperblock));
		}
		if self.log_zone_size > MAX_LOG_ZONE_SIZE {
			return Err(Error::new(ErrorKind::InvalidSuperblock));
		}
		let imap_bits = self.imap_blocks * self.block_size * 8;
		if imap_bits < self.ninodes + 1 {
			return Err(Error::new(ErrorKind::InvalidSuperblock));
		}
		let zmap_bits = self.zmap_blocks * self.block_size * 8;
		if zmap_bits < self.zones {
			return Err(Error::new(ErrorKind::InvalidSuperblock));
		}

		let inode_start = IMAP_START_BLOCK + self.imap_blocks + self.zmap_blocks;
		let inodes_per_block = self.block_size / INODE_SIZE as u32;
		let inode_table_blocks = (self.ninodes + inodes_per_block - 1) / inodes_per_block.max(1);
		let data_start_block = inode_start + inode_table_blocks;
		let blocks_per_zone = 1u32 << self.log_zone_size;
		let expected_first_data_zone = (data_start_block + blocks_per_zone - 1) / blocks_per_zone;
		if self.first_data_zone != expected_first_data_zone {
			return Err(Error::new(ErrorKind::InvalidSuperblock));
		}

		Ok(())
	}
}

/// Derived, immutable-after-mount on-disk geometry.
#[derive(Clone, Copy, Debug)]
pub struct Layout {
	pub block_size: u32,
	pub blocks_per_zone: u32,
	pub zone_size: u32,
	pub zones_per_indirect: u32,
	pub inodes_per_block: u32,
	pub total_inodes: u32,
	pub total_zones: u32,
	pub first_data_zone: u32,
	pub max_size: u64,

	pub imap_start: u32,
	pub zmap_start: u32,
	pub inode_start: u32,
}

impl Layout {
	pub fn from_superblock(sb: &Superblock) -> Result<Self> {
		sb.validate()?;

		let imap_start = IMAP_START_BLOCK;
		let zmap_start = imap_start + sb.imap_blocks;
		let inodes_per_block = sb.block_size / INODE_SIZE as u32;
		let inode_start = zmap_start + sb.zmap_blocks;
		let blocks_per_zone = 1u32 << sb.log_zone_size;

		Ok(Layout {
			block_size: sb.block_size,
			blocks_per_zone,
			zone_size: sb.block_size * blocks_per_zone,
			zones_per_indirect: sb.block_size / 4,
			inodes_per_block,
			total_inodes: sb.ninodes,
			total_zones: sb.zones,
			first_data_zone: sb.first_data_zone,
			max_size: sb.max_size as u64,
			imap_start,
			zmap_start,
			inode_start,
		})
	}

	pub fn zone_to_block(&self, zno: u32) -> u32 {
		zno * self.blocks_per_zone
	}

	/// Returns `(block_number, byte_offset_within_block)` for inode `ino`.
	pub fn inode_offset(&self, ino: u32) -> Result<(u32, u32)> {
		if ino == 0 || ino > self.total_inodes {
			return Err(Error::new(ErrorKind::InvalidInode));
		}
		let index = ino - 1;
		let block = self.inode_start + index / self.inodes_per_block;
		let offset = (index % self.inodes_per_block) * INODE_SIZE as u32;
		Ok((block, offset))
	}
}
