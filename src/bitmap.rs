//! Inode/zone bitmap cache with allocate/free and a rollback transaction.
//!
//! Grounded on the original `Allocator.cpp` (scan-with-hint allocation,
//! per-block dirty tracking, bit 0 reserved) and `mkfs/src/ext2.rs`'s
//! `fill_bitmap` for the byte/bit arithmetic idiom.

use std::collections::BTreeMap;

use crate::block_store::{BlockStore, Device};
use crate::error::{Error, ErrorKind, Result};

/// A cached bitmap (inode map or zone map), with allocate/free and an
/// in-memory rollback transaction.
pub struct BitmapAllocator {
	cache: Vec<u8>,
	dirty: Vec<bool>,
	start_block: u32,
	block_size: u32,
	/// First index that may ever be allocated (bit 0 is reserved for the
	/// inode map; the zone map's first usable index is `first_data_zone`).
	first_free_index: u32,
	/// Exclusive upper bound on valid indices.
	total_count: u32,
	last_allocated_hint: u32,
	pending: Option<BTreeMap<usize, u8>>,
}

impl BitmapAllocator {
	/// Loads `total_bits` worth of bitmap starting at `start_block`.
	/// `first_free_index` is the first index callers are allowed to
	/// allocate (1 for the inode map, `first_data_zone` for the zone map).
	pub fn load<D: Device>(
		store: &mut BlockStore<D>,
		start_block: u32,
		block_size: u32,
		total_bits: u32,
		first_free_index: u32,
	) -> Result<Self> {
		let total_blocks = (total_bits as u64 + block_size as u64 * 8 - 1) / (block_size as u64 * 8);
		let total_blocks = total_blocks as u32;
		let mut cache = vec![0u8; (total_blocks * block_size) as usize];
		for i in 0..total_blocks {
			let start = (i * block_size) as usize;
			let end = start + block_size as usize;
			store.read_block(start_block + i, &mut cache[start..end])?;
		}
		Ok(BitmapAllocator {
			cache,
			dirty: vec![false; total_blocks as usize],
			start_block,
			block_size,
			first_free_index,
			total_count: total_bits,
			last_allocated_hint: first_free_index,
			pending: None,
		})
	}

	fn read_byte(&self, byte_idx: usize) -> u8 {
		if let Some(pending) = &self.pending {
			if let Some(b) = pending.get(&byte_idx) {
				return *b;
			}
		}
		self.cache[byte_idx]
	}

	fn write_byte(&mut self, byte_idx: usize, value: u8) {
		if let Some(pending) = &mut self.pending {
			pending.insert(byte_idx, value);
		} else {
			self.cache[byte_idx] = value;
			self.dirty[byte_idx / self.block_size as usize] = true;
		}
	}

	fn get_bit(&self, index: u32) -> bool {
		let byte = (index / 8) as usize;
		let bit = index % 8;
		(self.read_byte(byte) >> bit) & 1 != 0
	}

	/// Returns whether the bit actually changed.
	fn set_bit(&mut self, index: u32, value: bool) -> bool {
		if self.get_bit(index) == value {
			return false;
		}
		let byte = (index / 8) as usize;
		let bit = index % 8;
		let mask = 1u8 << bit;
		let cur = self.read_byte(byte);
		let new = if value { cur | mask } else { cur & !mask };
		self.write_byte(byte, new);
		true
	}

	/// Scans from `last_allocated_hint`, wrapping within
	/// `[first_free_index, total_count)`, and returns the first index whose
	/// bit flips from 0 to 1.
	pub fn allocate(&mut self) -> Result<u32> {
		if self.total_count <= self.first_free_index {
			return Err(Error::new(ErrorKind::NoSpace));
		}
		let span = self.total_count - self.first_free_index;
		let mut idx = self.last_allocated_hint.clamp(self.first_free_index, self.total_count - 1);
		for _ in 0..span {
			if !self.get_bit(idx) {
				self.set_bit(idx, true);
				self.last_allocated_hint =
					if idx + 1 >= self.total_count { self.first_free_index } else { idx + 1 };
				return Ok(idx);
			}
			idx = if idx + 1 >= self.total_count { self.first_free_index } else { idx + 1 };
		}
		Err(Error::new(ErrorKind::NoSpace))
	}

	pub fn free(&mut self, index: u32) -> Result<()> {
		if index < self.first_free_index || index >= self.total_count {
			return Err(Error::new(ErrorKind::InvalidBmapIndex));
		}
		if !self.set_bit(index, false) {
			return Err(Error::new(ErrorKind::FreeingUnallocated));
		}
		Ok(())
	}

	/// Writes every dirty block back to the device. Only valid outside a
	/// transaction.
	pub fn sync<D: Device>(&mut self, store: &mut BlockStore<D>) -> Result<()> {
		if self.pending.is_some() {
			return Err(Error::new(ErrorKind::InTransaction));
		}
		for i in 0..self.dirty.len() {
			if self.dirty[i] {
				let start = i * self.block_size as usize;
				let end = start + self.block_size as usize;
				store.write_block(self.start_block + i as u32, &self.cache[start..end])?;
				self.dirty[i] = false;
			}
		}
		Ok(())
	}

	pub fn begin_tx(&mut self) -> Result<()> {
		if self.pending.is_some() {
			return Err(Error::new(ErrorKind::InTransaction));
		}
		self.pending = Some(BTreeMap::new());
		Ok(())
	}

	pub fn revert_tx(&mut self) -> Result<()> {
		if self.pending.take().is_none() {
			return Err(Error::new(ErrorKind::NotInTransaction));
		}
		Ok(())
	}

	/// Applies pending changes to the cache and marks their blocks dirty;
	/// `sync` flushes them to the device later.
	pub fn commit_tx(&mut self) -> Result<()> {
		let pending = match self.pending.take() {
			Some(p) => p,
			None => return Err(Error::new(ErrorKind::NotInTransaction)),
		};
		for (byte_idx, value) in pending {
			self.cache[byte_idx] = value;
			self.dirty[byte_idx / self.block_size as usize] = true;
		}
		Ok(())
	}

	/// Count of set bits within `[first_free_index, total_count)`.
	pub fn allocated_count(&self) -> u32 {
		let mut count = 0u32;
		for idx in self.first_free_index..self.total_count {
			if self.get_bit(idx) {
				count += 1;
			}
		}
		count
	}

	pub fn total_count(&self) -> u32 {
		self.total_count
	}
}
