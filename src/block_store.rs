//! Byte/block/zone I/O against the underlying device, with an optional
//! write-batch transaction mode.
//!
//! Grounded on `mkfs/src/ext2.rs`'s `Seek`+`Read`+`Write` access pattern and
//! the original `BlockDevice.cpp`'s retry-three-times and transaction-buffer
//! contract.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Error, ErrorKind, Result};

/// Soft cap, in blocks, on how large a single coalesced flush write can get
/// before `commit_tx` starts a new `write_bytes` call.
const MAX_COALESCE_BLOCKS: u32 = 1024;

/// Number of attempts `read_bytes`/`write_bytes` make before giving up.
const IO_RETRIES: u32 = 3;

/// The seekable fixed-size byte store a `BlockStore` is built on. Blanket
/// implemented for anything that is `Read + Write + Seek`; `sync_all`/
/// `sync_data` default to a no-op so in-memory test devices (e.g.
/// `io::Cursor<Vec<u8>>`) don't need to do anything special, while
/// `std::fs::File` overrides them to call down to the real syscalls.
pub trait Device: Read + Write + Seek {
	fn sync_all(&self) -> io::Result<()> {
		Ok(())
	}

	fn sync_data(&self) -> io::Result<()> {
		Ok(())
	}
}

impl Device for std::fs::File {
	fn sync_all(&self) -> io::Result<()> {
		std::fs::File::sync_all(self)
	}

	fn sync_data(&self) -> io::Result<()> {
		std::fs::File::sync_data(self)
	}
}

impl Device for io::Cursor<Vec<u8>> {}

#[derive(Default)]
struct Transaction {
	/// Pending block writes, keyed by block number, applied in ascending
	/// order on commit.
	pending: BTreeMap<u32, Vec<u8>>,
}

/// Byte/block/zone-granular I/O over a `Device`, with a batched,
/// all-or-nothing write mode.
pub struct BlockStore<D: Device> {
	device: D,
	block_size: u32,
	blocks_per_zone: u32,
	tx: Option<Transaction>,
}

impl<D: Device> BlockStore<D> {
	/// Wraps an already-open device. `block_size`/`blocks_per_zone` are not
	/// known yet at this point (the superblock hasn't been read); call
	/// [`BlockStore::set_geometry`] once `Layout` has been derived.
	pub fn new(device: D) -> Self {
		BlockStore { device, block_size: 0, blocks_per_zone: 0, tx: None }
	}

	/// Configures block and zone size once the on-disk layout is known.
	pub fn set_geometry(&mut self, block_size: u32, blocks_per_zone: u32) {
		self.block_size = block_size;
		self.blocks_per_zone = blocks_per_zone;
	}

	pub fn block_size(&self) -> u32 {
		self.block_size
	}

	pub fn in_transaction(&self) -> bool {
		self.tx.is_some()
	}

	/// Consumes the store, flushing any allocator-visible state via
	/// `fsync`. Returns the device to the caller.
	pub fn close(mut self) -> Result<D> {
		if self.tx.is_some() {
			return Err(Error::new(ErrorKind::InTransaction));
		}
		self.fsync()?;
		Ok(self.device)
	}

	pub fn fsync(&mut self) -> Result<()> {
		self.device
			.sync_all()
			.map_err(|e| Error::with_source(ErrorKind::WriteFail, e))
	}

	pub fn fdatasync(&mut self) -> Result<()> {
		self.device
			.sync_data()
			.map_err(|e| Error::with_source(ErrorKind::WriteFail, e))
	}

	// -- byte granularity --------------------------------------------------

	pub fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
		if self.tx.is_some() {
			return Err(Error::new(ErrorKind::InTransaction));
		}
		self.read_bytes_retried(offset, buf)
	}

	pub fn write_bytes(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
		if self.tx.is_some() {
			return Err(Error::new(ErrorKind::InTransaction));
		}
		self.write_bytes_retried(offset, buf)
	}

	fn read_bytes_retried(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
		let mut last = None;
		for _ in 0..IO_RETRIES {
			match self.device.seek(SeekFrom::Start(offset)).and_then(|_| self.device.read_exact(buf)) {
				Ok(()) => return Ok(()),
				Err(e) => last = Some(e),
			}
		}
		Err(Error::with_source(ErrorKind::ReadFail, last.unwrap()))
	}

	fn write_bytes_retried(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
		let mut last = None;
		for _ in 0..IO_RETRIES {
			match self.device.seek(SeekFrom::Start(offset)).and_then(|_| self.device.write_all(buf)) {
				Ok(()) => return Ok(()),
				Err(e) => last = Some(e),
			}
		}
		Err(Error::with_source(ErrorKind::WriteFail, last.unwrap()))
	}

	// -- block granularity ---------------------------------------------------

	pub fn read_block(&mut self, bno: u32, buf: &mut [u8]) -> Result<()> {
		debug_assert_eq!(buf.len(), self.block_size as usize);
		if let Some(tx) = &self.tx {
			if let Some(cached) = tx.pending.get(&bno) {
				buf.copy_from_slice(cached);
				return Ok(());
			}
		}
		let offset = bno as u64 * self.block_size as u64;
		self.read_bytes_retried(offset, buf)
	}

	pub fn write_block(&mut self, bno: u32, buf: &[u8]) -> Result<()> {
		debug_assert_eq!(buf.len(), self.block_size as usize);
		if let Some(tx) = &mut self.tx {
			tx.pending.insert(bno, buf.to_vec());
			return Ok(());
		}
		let offset = bno as u64 * self.block_size as u64;
		self.write_bytes_retried(offset, buf)
	}

	// -- zone granularity ----------------------------------------------------

	pub fn read_zone(&mut self, zno: u32, buf: &mut [u8]) -> Result<()> {
		debug_assert_eq!(buf.len(), self.block_size as usize * self.blocks_per_zone as usize);
		let base = zno * self.blocks_per_zone;
		for i in 0..self.blocks_per_zone {
			let start = i as usize * self.block_size as usize;
			let end = start + self.block_size as usize;
			self.read_block(base + i, &mut buf[start..end])?;
		}
		Ok(())
	}

	pub fn write_zone(&mut self, zno: u32, buf: &[u8]) -> Result<()> {
		debug_assert_eq!(buf.len(), self.block_size as usize * self.blocks_per_zone as usize);
		let base = zno * self.blocks_per_zone;
		for i in 0..self.blocks_per_zone {
			let start = i as usize * self.block_size as usize;
			let end = start + self.block_size as usize;
			self.write_block(base + i, &buf[start..end])?;
		}
		Ok(())
	}

	// -- transactions ----------------------------------------------------------

	pub fn begin_tx(&mut self) -> Result<()> {
		if self.tx.is_some() {
			return Err(Error::new(ErrorKind::InTransaction));
		}
		self.tx = Some(Transaction::default());
		Ok(())
	}

	pub fn revert_tx(&mut self) -> Result<()> {
		if self.tx.take().is_none() {
			return Err(Error::new(ErrorKind::NotInTransaction));
		}
		Ok(())
	}

	/// Flushes the pending block writes in ascending block-number order,
	/// coalescing contiguous runs into a single `write_bytes` call up to
	/// [`MAX_COALESCE_BLOCKS`]. On any flush failure the transaction stays
	/// active (with the un-flushed remainder still pending) so the caller
	/// knows no further writes through this store are valid until it
	/// reverts or retries.
	pub fn commit_tx(&mut self) -> Result<()> {
		let tx = match &mut self.tx {
			Some(tx) => tx,
			None => return Err(Error::new(ErrorKind::NotInTransaction)),
		};

		while let Some((&first_bno, _)) = tx.pending.iter().next() {
			let mut run: Vec<u8> = Vec::new();
			let mut bno = first_bno;
			let mut count = 0u32;
			loop {
				let block = match tx.pending.get(&bno) {
					Some(b) => b.clone(),
					None => break,
				};
				run.extend_from_slice(&block);
				tx.pending.remove(&bno);
				count += 1;
				bno += 1;
				if count >= MAX_COALESCE_BLOCKS || !tx.pending.contains_key(&bno) {
					break;
				}
			}
			let offset = first_bno as u64 * self.block_size as u64;
			if let Err(e) = self.write_bytes_retried(offset, &run) {
				return Err(e);
			}
		}

		self.tx = None;
		Ok(())
	}
}
