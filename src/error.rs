//! Error taxonomy shared by every component.

use std::fmt;
use std::io;

/// A distinct failure kind, matching the taxonomy of the on-disk filesystem
/// contract. Kept separate from [`Error`] so callers can match on the kind
/// without caring whether a source [`io::Error`] is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
	// Device
	OpenDeviceFail,
	CloseDeviceFail,
	ReadFail,
	WriteFail,

	// Format
	InvalidSuperblock,
	FsBroken,

	// Resource
	OutOfMemory,
	NoSpace,
	FreeingUnallocated,
	InvalidBmapIndex,

	// Name / lookup
	FileNotFound,
	FileNameExists,
	NameLengthExceeded,
	PathTooDeep,
	LinkEmpty,
	LinkTooLong,
	NotDirectory,
	NotRegularFile,
	DirectoryNotEmpty,
	LinkDirectory,
	UnlinkDirectory,
	MoveToSubdir,
	DeleteRootDir,
	TooManyLinks,
	NotSymlink,

	// State
	InvalidInode,
	InvalidFileOffset,
	InTransaction,
	NotInTransaction,
	WriteLocked,
	ReadOnlyFs,
}

impl ErrorKind {
	/// A short, stable machine name, useful for logging without pulling in
	/// the `Display` impl's prose.
	pub fn as_str(&self) -> &'static str {
		match self {
			ErrorKind::OpenDeviceFail => "open_device_fail",
			ErrorKind::CloseDeviceFail => "close_device_fail",
			ErrorKind::ReadFail => "read_fail",
			ErrorKind::WriteFail => "write_fail",
			ErrorKind::InvalidSuperblock => "invalid_superblock",
			ErrorKind::FsBroken => "fs_broken",
			ErrorKind::OutOfMemory => "out_of_memory",
			ErrorKind::NoSpace => "no_space",
			ErrorKind::FreeingUnallocated => "freeing_unallocated",
			ErrorKind::InvalidBmapIndex => "invalid_bmap_index",
			ErrorKind::FileNotFound => "file_not_found",
			ErrorKind::FileNameExists => "file_name_exists",
			ErrorKind::NameLengthExceeded => "name_length_exceeded",
			ErrorKind::PathTooDeep => "path_too_deep",
			ErrorKind::LinkEmpty => "link_empty",
			ErrorKind::LinkTooLong => "link_too_long",
			ErrorKind::NotDirectory => "not_directory",
			ErrorKind::NotRegularFile => "not_regular_file",
			ErrorKind::DirectoryNotEmpty => "directory_not_empty",
			ErrorKind::LinkDirectory => "link_directory",
			ErrorKind::UnlinkDirectory => "unlink_directory",
			ErrorKind::MoveToSubdir => "move_to_subdir",
			ErrorKind::DeleteRootDir => "delete_root_dir",
			ErrorKind::TooManyLinks => "too_many_links",
			ErrorKind::NotSymlink => "not_symlink",
			ErrorKind::InvalidInode => "invalid_inode",
			ErrorKind::InvalidFileOffset => "invalid_file_offset",
			ErrorKind::InTransaction => "in_transaction",
			ErrorKind::NotInTransaction => "not_in_transaction",
			ErrorKind::WriteLocked => "write_locked",
			ErrorKind::ReadOnlyFs => "read_only_fs",
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// The crate's error type: a [`ErrorKind`] plus an optional underlying
/// [`io::Error`] for device-level failures.
#[derive(Debug)]
pub struct Error {
	kind: ErrorKind,
	source: Option<io::Error>,
}

impl Error {
	pub fn new(kind: ErrorKind) -> Self {
		Error { kind, source: None }
	}

	pub fn with_source(kind: ErrorKind, source: io::Error) -> Self {
		Error { kind, source: Some(source) }
	}

	pub fn kind(&self) -> ErrorKind {
		self.kind
	}
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.source {
			Some(src) => write!(f, "{}: {}", self.kind, src),
			None => write!(f, "{}", self.kind),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
	}
}

impl From<ErrorKind> for Error {
	fn from(kind: ErrorKind) -> Self {
		Error::new(kind)
	}
}

/// Device I/O errors have no natural [`ErrorKind`] of their own at the point
/// they're raised; callers attach one via [`Error::with_source`]. This impl
/// exists so `?` works in the rare spot where only an `io::Error` is at hand
/// and a `ReadFail` is the right generic bucket (e.g. inside `io::Read`/
/// `io::Write`/`io::Seek` glue).
impl From<io::Error> for Error {
	fn from(source: io::Error) -> Self {
		Error::with_source(ErrorKind::ReadFail, source)
	}
}

pub type Result<T> = std::result::Result<T, Error>;
