//! Translates an inode's logical zone index into a physical zone number,
//! walking the direct/single/double/triple indirect pointers and allocating
//! new zones and indirect blocks on demand.
//!
//! Grounded on the original `FileMapper.cpp`'s `mapLogicalToPhysical` (same
//! per-level structure: direct range, then single/double/triple indirect,
//! each level reading an `IndirectBlock` of raw zone numbers) for the
//! mapping direction, and `FileWriter.cpp`'s truncate path for the
//! free-and-collapse direction this crate adds on top.

use crate::bitmap::BitmapAllocator;
use crate::block_store::{BlockStore, Device};
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::inode::Inode;
use crate::layout::Layout;

/// Addresses a single zone pointer within an inode or an indirect block.
pub struct ZoneMapper {
	layout: Layout,
	zero_init_new_zones: bool,
}

impl ZoneMapper {
	pub fn new(layout: Layout, zero_init_new_zones: bool) -> Self {
		ZoneMapper { layout, zero_init_new_zones }
	}

	fn read_indirect<D: Device>(&self, store: &mut BlockStore<D>, zno: u32) -> Result<Vec<u32>> {
		let mut buf = vec![0u8; self.layout.zone_size as usize];
		store.read_zone(zno, &mut buf)?;
		let n = self.layout.zones_per_indirect as usize;
		let mut zones = Vec::with_capacity(n);
		for i in 0..n {
			let bytes = [buf[i * 4], buf[i * 4 + 1], buf[i * 4 + 2], buf[i * 4 + 3]];
			zones.push(u32::from_le_bytes(bytes));
		}
		Ok(zones)
	}

	fn write_indirect<D: Device>(&self, store: &mut BlockStore<D>, zno: u32, zones: &[u32]) -> Result<()> {
		let mut buf = vec![0u8; self.layout.zone_size as usize];
		for (i, z) in zones.iter().enumerate() {
			buf[i * 4..i * 4 + 4].copy_from_slice(&z.to_le_bytes());
		}
		store.write_zone(zno, &buf)
	}

	fn alloc_zone<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		bitmap: &mut BitmapAllocator,
		zero_init: bool,
	) -> Result<u32> {
		let zno = bitmap.allocate()?;
		if zero_init {
			let zeros = vec![0u8; self.layout.zone_size as usize];
			store.write_zone(zno, &zeros)?;
		}
		Ok(zno)
	}

	/// Number of data zones one pointer at `level` addresses (0 = a direct
	/// data zone, 1/2/3 = single/double/triple indirect).
	fn capacity(&self, level: u32) -> u64 {
		match level {
			0 => 1,
			_ => (self.layout.zones_per_indirect as u64).pow(level),
		}
	}

	/// Resolves the physical zone for `logical_zone_index`. Allocates any
	/// missing indirect blocks and the data zone itself when
	/// `allocate_if_missing` is set; otherwise returns `0` for a hole.
	pub fn map<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		bitmap: &mut BitmapAllocator,
		inode: &mut Inode,
		logical_zone_index: u32,
		allocate_if_missing: bool,
	) -> Result<u32> {
		let mut idx = logical_zone_index as u64;

		if idx < DIRECT_ZONES as u64 {
			let slot = idx as usize;
			if inode.zone[slot] == 0 {
				if !allocate_if_missing {
					return Ok(0);
				}
				inode.zone[slot] = self.alloc_zone(store, bitmap, self.zero_init_new_zones)?;
			}
			return Ok(inode.zone[slot]);
		}
		idx -= DIRECT_ZONES as u64;

		for (level, slot) in [(1u32, SINGLE_INDIRECT), (2u32, DOUBLE_INDIRECT), (3u32, TRIPLE_INDIRECT)] {
			let cap = self.capacity(level);
			if idx < cap {
				return self.map_through_indirect(store, bitmap, &mut inode.zone[slot], level, idx, allocate_if_missing);
			}
			idx -= cap;
		}

		Err(Error::new(ErrorKind::InvalidFileOffset))
	}

	/// Walks down from an indirect pointer at `level` to the data zone
	/// addressed by `idx` (relative to that pointer's own range).
	fn map_through_indirect<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		bitmap: &mut BitmapAllocator,
		zone_ptr: &mut u32,
		level: u32,
		idx: u64,
		allocate_if_missing: bool,
	) -> Result<u32> {
		if *zone_ptr == 0 {
			if !allocate_if_missing {
				return Ok(0);
			}
			*zone_ptr = self.alloc_zone(store, bitmap, true)?;
		}

		if level == 1 {
			let mut zones = self.read_indirect(store, *zone_ptr)?;
			let slot = idx as usize;
			if zones[slot] == 0 {
				if !allocate_if_missing {
					return Ok(0);
				}
				zones[slot] = self.alloc_zone(store, bitmap, self.zero_init_new_zones)?;
				self.write_indirect(store, *zone_ptr, &zones)?;
			}
			return Ok(zones[slot]);
		}

		let child_cap = self.capacity(level - 1);
		let mut zones = self.read_indirect(store, *zone_ptr)?;
		let slot = (idx / child_cap) as usize;
		let child_idx = idx % child_cap;
		let physical = self.map_through_indirect(store, bitmap, &mut zones[slot], level - 1, child_idx, allocate_if_missing)?;
		self.write_indirect(store, *zone_ptr, &zones)?;
		Ok(physical)
	}

	/// Frees every zone at or beyond `start_logical_index`, collapsing
	/// indirect blocks that become entirely empty. Used by truncate.
	pub fn free_from<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		bitmap: &mut BitmapAllocator,
		inode: &mut Inode,
		start_logical_index: u32,
	) -> Result<()> {
		let mut base = 0u64;
		for slot in 0..DIRECT_ZONES {
			if base >= start_logical_index as u64 {
				if inode.zone[slot] != 0 {
					bitmap.free(inode.zone[slot])?;
					inode.zone[slot] = 0;
				}
			}
			base += 1;
		}

		for (level, slot) in [(1u32, SINGLE_INDIRECT), (2u32, DOUBLE_INDIRECT), (3u32, TRIPLE_INDIRECT)] {
			let cap = self.capacity(level);
			let range_start = base;
			let local_start = if start_logical_index as u64 > range_start {
				start_logical_index as u64 - range_start
			} else {
				0
			};
			if local_start < cap {
				let became_empty =
					self.free_recursive(store, bitmap, &mut inode.zone[slot], level, local_start)?;
				if became_empty {
					inode.zone[slot] = 0;
				}
			}
			base += cap;
		}

		Ok(())
	}

	/// Returns `true` if the subtree rooted at `zone_ptr` is now fully free
	/// (so the caller should free `zone_ptr` itself too).
	fn free_recursive<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		bitmap: &mut BitmapAllocator,
		zone_ptr: &mut u32,
		level: u32,
		local_start: u64,
	) -> Result<bool> {
		if *zone_ptr == 0 {
			return Ok(true);
		}
		if level == 0 {
			if local_start == 0 {
				bitmap.free(*zone_ptr)?;
				*zone_ptr = 0;
				return Ok(true);
			}
			return Ok(false);
		}

		let mut zones = self.read_indirect(store, *zone_ptr)?;
		let child_cap = self.capacity(level - 1);
		let mut all_empty = true;
		for (i, child) in zones.iter_mut().enumerate() {
			let child_range_start = i as u64 * child_cap;
			if child_range_start + child_cap <= local_start {
				if *child != 0 {
					all_empty = false;
				}
				continue;
			}
			let child_local_start = if local_start > child_range_start { local_start - child_range_start } else { 0 };
			let freed = self.free_recursive(store, bitmap, child, level - 1, child_local_start)?;
			if !freed {
				all_empty = false;
			}
		}
		self.write_indirect(store, *zone_ptr, &zones)?;

		if all_empty && local_start == 0 {
			bitmap.free(*zone_ptr)?;
			*zone_ptr = 0;
			return Ok(true);
		}
		Ok(false)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::layout::Superblock;
	use std::io::Cursor;

	fn setup(block_size: u32) -> (BlockStore<Cursor<Vec<u8>>>, BitmapAllocator, ZoneMapper) {
		let zones = 4096u32;
		let zmap_bits = zones;
		let zmap_blocks = (zmap_bits + block_size * 8 - 1) / (block_size * 8);
		let ninodes = 32u32;
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
		let bitmap =
			BitmapAllocator::load(&mut bs, layout.zmap_start, block_size, layout.total_zones, layout.first_data_zone)
				.unwrap();
		(bs, bitmap, ZoneMapper::new(layout, true))
	}

	#[test]
	fn direct_zone_allocates_once_and_is_stable() {
		let (mut bs, mut bmap, mapper) = setup(1024);
		let mut inode = Inode::default();
		let z1 = mapper.map(&mut bs, &mut bmap, &mut inode, 0, true).unwrap();
		assert_ne!(z1, 0);
		let z2 = mapper.map(&mut bs, &mut bmap, &mut inode, 0, true).unwrap();
		assert_eq!(z1, z2);
	}

	#[test]
	fn hole_without_allocate_is_zero() {
		let (mut bs, mut bmap, mapper) = setup(1024);
		let mut inode = Inode::default();
		let z = mapper.map(&mut bs, &mut bmap, &mut inode, 3, false).unwrap();
		assert_eq!(z, 0);
	}

	#[test]
	fn single_indirect_zone_allocated_on_demand() {
		let (mut bs, mut bmap, mapper) = setup(1024);
		let mut inode = Inode::default();
		let logical = DIRECT_ZONES as u32;
		let z = mapper.map(&mut bs, &mut bmap, &mut inode, logical, true).unwrap();
		assert_ne!(z, 0);
		assert_ne!(inode.zone[SINGLE_INDIRECT], 0);
		let again = mapper.map(&mut bs, &mut bmap, &mut inode, logical, false).unwrap();
		assert_eq!(again, z);
	}

	#[test]
	fn free_from_zero_releases_everything() {
		let (mut bs, mut bmap, mapper) = setup(1024);
		let mut inode = Inode::default();
		for i in 0..10u32 {
			mapper.map(&mut bs, &mut bmap, &mut inode, i, true).unwrap();
		}
		let before = bmap.allocated_count();
		mapper.free_from(&mut bs, &mut bmap, &mut inode, 0).unwrap();
		assert!(bmap.allocated_count() < before);
		assert!(inode.zone.iter().all(|&z| z == 0));
	}

	#[test]
	fn free_from_midpoint_keeps_earlier_direct_zones() {
		let (mut bs, mut bmap, mapper) = setup(1024);
		let mut inode = Inode::default();
		for i in 0..DIRECT_ZONES as u32 {
			mapper.map(&mut bs, &mut bmap, &mut inode, i, true).unwrap();
		}
		mapper.free_from(&mut bs, &mut bmap, &mut inode, 3).unwrap();
		assert_ne!(inode.zone[0], 0);
		assert_ne!(inode.zone[2], 0);
		assert_eq!(inode.zone[3], 0);
		assert_eq!(inode.zone[6], 0);
	}
}
