//! Directory contents: a flat array of 64-byte entries, read/written through
//! [`crate::file_io::FileIo`] exactly like regular file data.
//!
//! Grounded on the original `DirReader.cpp`/`DirWriter.cpp`: same
//! tombstone-reuse-before-append allocation strategy in `addDirEntry`, same
//! `inode == 0` tombstone convention. This crate zeroes a removed entry's
//! name instead of overwriting it with the original's literal placeholder
//! string, since the tombstone's only load-bearing field is `d_inode == 0`.

use crate::bitmap::BitmapAllocator;
use crate::block_store::{BlockStore, Device};
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::file_io::FileIo;
use crate::inode::{Attrs, Inode, InodeStore};
use crate::layout::Layout;
use crate::zone_mapper::ZoneMapper;

/// One live directory entry as returned to callers; tombstones are never
/// surfaced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
	pub index: u32,
	pub ino: u32,
	pub name: String,
}

/// A listed entry paired with the attributes of the inode it points at,
/// fetched via `InodeStore` — what a directory listing actually hands back
/// to a caller, not just the raw slot.
#[derive(Clone, Debug, PartialEq)]
pub struct DirEntryAttrs {
	pub entry: DirEntry,
	pub attrs: Attrs,
}

fn encode_entry(ino: u32, name: &str) -> Result<[u8; DIRENT_SIZE]> {
	let bytes = name.as_bytes();
	if bytes.is_empty() || bytes.len() > DIRENT_NAME_MAX {
		return Err(Error::new(ErrorKind::NameLengthExceeded));
	}
	let mut raw = [0u8; DIRENT_SIZE];
	raw[0..4].copy_from_slice(&ino.to_le_bytes());
	raw[4..4 + bytes.len()].copy_from_slice(bytes);
	Ok(raw)
}

fn decode_entry(raw: &[u8]) -> (u32, String) {
	let ino = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
	let name_bytes = &raw[4..4 + DIRENT_NAME_MAX];
	let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(DIRENT_NAME_MAX);
	let name = String::from_utf8_lossy(&name_bytes[..end]).into_owned();
	(ino, name)
}

/// Reads and mutates directory entries for a single directory inode.
pub struct DirTable {
	layout: Layout,
}

impl DirTable {
	pub fn new(layout: Layout) -> Self {
		DirTable { layout }
	}

	fn entry_count(&self, dir: &Inode) -> Result<u32> {
		if !dir.is_dir() {
			return Err(Error::new(ErrorKind::NotDirectory));
		}
		if dir.size as usize % DIRENT_SIZE != 0 {
			return Err(Error::new(ErrorKind::FsBroken));
		}
		Ok(dir.size / DIRENT_SIZE as u32)
	}

	fn read_raw_entry<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir: &Inode,
		index: u32,
	) -> Result<[u8; DIRENT_SIZE]> {
		let mut raw = [0u8; DIRENT_SIZE];
		let n = file_io.read(store, zone_mapper, bitmap, dir, &mut raw, index as u64 * DIRENT_SIZE as u64)?;
		if n != DIRENT_SIZE {
			return Err(Error::new(ErrorKind::FsBroken));
		}
		Ok(raw)
	}

	/// Lists every live (non-tombstone) entry.
	pub fn list<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir: &Inode,
	) -> Result<Vec<DirEntry>> {
		let total = self.entry_count(dir)?;
		let mut out = Vec::new();
		for index in 0..total {
			let raw = self.read_raw_entry(store, file_io, zone_mapper, bitmap, dir, index)?;
			let (ino, name) = decode_entry(&raw);
			if ino != 0 {
				out.push(DirEntry { index, ino, name });
			}
		}
		Ok(out)
	}

	/// Like [`DirTable::list`] but fetches each entry's inode attributes
	/// too, as a directory listing hands back to a caller.
	pub fn list_with_attrs<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		istore: &InodeStore,
		dir: &Inode,
	) -> Result<Vec<DirEntryAttrs>> {
		let entries = self.list(store, file_io, zone_mapper, bitmap, dir)?;
		let mut out = Vec::with_capacity(entries.len());
		for entry in entries {
			let inode = istore.read(store, entry.ino)?;
			let attrs = Attrs::from_inode(entry.ino, &inode, self.layout.block_size);
			out.push(DirEntryAttrs { entry, attrs });
		}
		Ok(out)
	}

	/// Looks up a single entry by name.
	pub fn find<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir: &Inode,
		name: &str,
	) -> Result<Option<DirEntry>> {
		let total = self.entry_count(dir)?;
		for index in 0..total {
			let raw = self.read_raw_entry(store, file_io, zone_mapper, bitmap, dir, index)?;
			let (ino, entry_name) = decode_entry(&raw);
			if ino != 0 && entry_name == name {
				return Ok(Some(DirEntry { index, ino, name: entry_name }));
			}
		}
		Ok(None)
	}

	/// Returns `true` if the directory holds only `.`/`..` (or nothing at
	/// all, for a directory inode that hasn't been populated yet).
	pub fn is_empty<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir: &Inode,
	) -> Result<bool> {
		let entries = self.list(store, file_io, zone_mapper, bitmap, dir)?;
		Ok(entries.iter().all(|e| e.name == "." || e.name == ".."))
	}

	/// Writes `(ino, name)` into slot `index`, growing the directory's size
	/// first if `index` is one past the current last entry.
	fn write_entry<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir_ino: u32,
		dir: &mut Inode,
		index: u32,
		ino: u32,
		name: &str,
	) -> Result<()> {
		let _ = dir_ino;
		if !dir.is_dir() {
			return Err(Error::new(ErrorKind::NotDirectory));
		}
		let raw = encode_entry(ino, name)?;
		let offset = index as u64 * DIRENT_SIZE as u64;
		file_io.write(store, zone_mapper, bitmap, dir, &raw, offset)?;
		Ok(())
	}

	/// Adds `name -> ino`, reusing the first tombstone slot if one exists,
	/// otherwise appending a new entry and growing the directory.
	pub fn add_entry<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir_ino: u32,
		dir: &mut Inode,
		ino: u32,
		name: &str,
	) -> Result<u32> {
		if ino == 0 {
			return Err(Error::new(ErrorKind::InvalidInode));
		}
		let total = self.entry_count(dir)?;
		let mut free_slot = None;
		for index in 0..total {
			let raw = self.read_raw_entry(store, file_io, zone_mapper, bitmap, dir, index)?;
			let (existing_ino, existing_name) = decode_entry(&raw);
			if existing_ino != 0 && existing_name == name {
				return Err(Error::new(ErrorKind::FileNameExists));
			}
			if existing_ino == 0 && free_slot.is_none() {
				free_slot = Some(index);
			}
		}
		let index = free_slot.unwrap_or(total);
		self.write_entry(store, file_io, zone_mapper, bitmap, dir_ino, dir, index, ino, name)?;
		Ok(index)
	}

	/// Reads the entry at a known slot index, if it's still live.
	pub fn entry_at<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir: &Inode,
		index: u32,
	) -> Result<Option<DirEntry>> {
		let total = self.entry_count(dir)?;
		if index >= total {
			return Ok(None);
		}
		let raw = self.read_raw_entry(store, file_io, zone_mapper, bitmap, dir, index)?;
		let (ino, name) = decode_entry(&raw);
		if ino == 0 {
			return Ok(None);
		}
		Ok(Some(DirEntry { index, ino, name }))
	}

	/// Tombstones the entry at `index`.
	pub fn remove_entry<D: Device>(
		&self,
		store: &mut BlockStore<D>,
		file_io: &FileIo,
		zone_mapper: &ZoneMapper,
		bitmap: &mut BitmapAllocator,
		dir_ino: u32,
		dir: &mut Inode,
		index: u32,
	) -> Result<()> {
		self.write_entry(store, file_io, zone_mapper, bitmap, dir_ino, dir, index, 0, ".")
	}
}
