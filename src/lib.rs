//! A user-space implementation of the on-disk core of the MINIX v3
//! filesystem: superblock/layout parsing, inode and zone bitmap allocation,
//! the direct/indirect zone map, file read/write/truncate with hole
//! semantics, directory entries, path resolution with symlink expansion,
//! link-count bookkeeping, and an in-memory transaction batch tying a
//! block store and both bitmaps together atomically.
//!
//! This crate implements the core only — it has no opinion on how a host
//! turns kernel filesystem requests into calls on [`fs::Fs`]; that bridge,
//! and any mount-helper CLI, are built on top of this crate, not inside it.

mod bitmap;
mod block_store;
mod consts;
mod dir;
mod error;
mod file_io;
mod fs;
mod inode;
mod layout;
mod name_ops;
mod open_table;
mod path;
mod tx;
mod zone_mapper;

pub use block_store::Device;
pub use consts::{
	DIRENT_NAME_MAX, DIRENT_SIZE, IMAP_START_BLOCK, INODE_SIZE, MAGIC, MAX_NLINKS, MAX_PATH_DEPTH,
	MAX_SYMLINK_LEN, ROOT_INODE, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG, SUPERBLOCK_OFFSET,
};
pub use dir::{DirEntry, DirEntryAttrs};
pub use error::{Error, ErrorKind, Result};
pub use fs::{Fs, Handle, MountOptions, OpenFlags, OwnerUpdate, StatFs};
pub use inode::Attrs;
pub use name_ops::TimeUpdate;
