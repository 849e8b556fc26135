//! Composes one [`crate::block_store::BlockStore`] transaction and two
//! [`crate::bitmap::BitmapAllocator`] transactions (inode map, zone map)
//! into a single all-or-nothing unit, plus an RAII guard that reverts on an
//! early return.
//!
//! Grounded on the original `TransactionManager.h`/`.cpp`: begin opens the
//! three sub-transactions in order, unwinding any that already opened on a
//! later failure; commit runs in the same order and, on any failure, sets a
//! sticky write-lock recording why instead of leaving the filesystem
//! half-committed.

use crate::bitmap::BitmapAllocator;
use crate::block_store::{BlockStore, Device};
use crate::error::{Error, ErrorKind, Result};

pub struct TxManager {
	in_tx: bool,
	write_locked: Option<ErrorKind>,
}

impl TxManager {
	pub fn new() -> Self {
		TxManager { in_tx: false, write_locked: None }
	}

	pub fn is_write_locked(&self) -> bool {
		self.write_locked.is_some()
	}

	/// Opens all three sub-transactions and returns a guard that reverts
	/// them on drop unless [`TxGuard::commit`] is called first.
	pub fn begin_tx<'a, D: Device>(
		&'a mut self,
		store: &'a mut BlockStore<D>,
		imap: &'a mut BitmapAllocator,
		zmap: &'a mut BitmapAllocator,
	) -> Result<TxGuard<'a, D>> {
		if let Some(reason) = self.write_locked {
			return Err(Error::new(reason));
		}
		if self.in_tx {
			return Err(Error::new(ErrorKind::InTransaction));
		}

		store.begin_tx()?;
		if let Err(e) = imap.begin_tx() {
			let _ = store.revert_tx();
			return Err(e);
		}
		if let Err(e) = zmap.begin_tx() {
			let _ = store.revert_tx();
			let _ = imap.revert_tx();
			return Err(e);
		}
		self.in_tx = true;
		Ok(TxGuard { manager: self, store, imap, zmap, committed: false })
	}

	fn revert_tx<D: Device>(
		&mut self,
		store: &mut BlockStore<D>,
		imap: &mut BitmapAllocator,
		zmap: &mut BitmapAllocator,
	) -> Result<()> {
		if !self.in_tx {
			return Err(Error::new(ErrorKind::NotInTransaction));
		}
		store.revert_tx()?;
		imap.revert_tx()?;
		zmap.revert_tx()?;
		self.in_tx = false;
		Ok(())
	}

	fn commit_tx<D: Device>(
		&mut self,
		store: &mut BlockStore<D>,
		imap: &mut BitmapAllocator,
		zmap: &mut BitmapAllocator,
	) -> Result<()> {
		if !self.in_tx {
			return Err(Error::new(ErrorKind::NotInTransaction));
		}
		if let Err(e) = store.commit_tx() {
			self.write_locked = Some(e.kind());
			return Err(e);
		}
		if let Err(e) = imap.commit_tx() {
			self.write_locked = Some(e.kind());
			return Err(e);
		}
		if let Err(e) = zmap.commit_tx() {
			self.write_locked = Some(e.kind());
			return Err(e);
		}
		self.in_tx = false;
		Ok(())
	}
}

/// Reverts the transaction on drop unless [`TxGuard::commit`] ran first.
pub struct TxGuard<'a, D: Device> {
	manager: &'a mut TxManager,
	store: &'a mut BlockStore<D>,
	imap: &'a mut BitmapAllocator,
	zmap: &'a mut BitmapAllocator,
	committed: bool,
}

impl<'a, D: Device> TxGuard<'a, D> {
	/// Borrows the three components this guard is holding open, for callers
	/// that need to perform mutations while the transaction is active.
	pub fn parts(&mut self) -> (&mut BlockStore<D>, &mut BitmapAllocator, &mut BitmapAllocator) {
		(&mut *self.store, &mut *self.imap, &mut *self.zmap)
	}

	pub fn commit(mut self) -> Result<()> {
		self.manager.commit_tx(self.store, self.imap, self.zmap)?;
		self.committed = true;
		Ok(())
	}
}

impl<'a, D: Device> Drop for TxGuard<'a, D> {
	fn drop(&mut self) {
		if !self.committed {
			let _ = self.manager.revert_tx(self.store, self.imap, self.zmap);
		}
	}
}
