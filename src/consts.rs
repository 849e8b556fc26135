//! On-disk constants for the MINIX v3 format. Mirrors the layout described
//! in the spec's §6 "On-disk format" and the original `Constants.h`/
//! `Inode.h`.

/// Byte offset of the superblock from the start of the device.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
/// Raw on-disk size of the superblock record, padding included.
pub const SUPERBLOCK_SIZE: usize = 32;

/// MINIX v3 magic number.
pub const MAGIC: u16 = 0x4d5a;

/// Block holding the boot sector.
pub const BOOT_BLOCK: u32 = 0;
/// Block holding the superblock.
pub const SUPER_BLOCK: u32 = 1;
/// Fixed start of the inode bitmap, right after the superblock block.
pub const IMAP_START_BLOCK: u32 = 2;

/// Size in bytes of one on-disk inode record.
pub const INODE_SIZE: usize = 64;
/// Number of zone-pointer slots in an inode.
pub const ZONE_SLOTS: usize = 10;
/// Direct zone slots: indices [0, DIRECT_ZONES).
pub const DIRECT_ZONES: usize = 7;
/// Index of the single-indirect slot.
pub const SINGLE_INDIRECT: usize = 7;
/// Index of the double-indirect slot.
pub const DOUBLE_INDIRECT: usize = 8;
/// Index of the triple-indirect slot.
pub const TRIPLE_INDIRECT: usize = 9;

/// Size in bytes of one directory entry.
pub const DIRENT_SIZE: usize = 64;
/// Max length (bytes, not counting the NUL) of a directory entry name.
pub const DIRENT_NAME_MAX: usize = 60;

/// Root inode number; inode numbers are 1-based, 0 is never valid.
pub const ROOT_INODE: u32 = 1;

/// Maximum path component/symlink-expansion depth guarded by PathResolver.
pub const MAX_PATH_DEPTH: u32 = 40;

/// Maximum symlink target length (one block is always safely enough and
/// matches the original `SymlinkCreator`'s cap).
pub const MAX_SYMLINK_LEN: usize = 1024;

/// Maximum hard-link count an inode may carry (fits in the 16-bit on-disk
/// field).
pub const MAX_NLINKS: u16 = u16::MAX;

/// Permitted on-disk block sizes.
pub const VALID_BLOCK_SIZES: [u32; 3] = [1024, 2048, 4096];

/// Maximum log2(blocks per zone).
pub const MAX_LOG_ZONE_SIZE: u16 = 7;

// File-type bits within `mode`, POSIX-compatible values so callers can treat
// them exactly like the host's own `S_IFMT` family.
pub const S_IFMT: u16 = 0o170000;
pub const S_IFREG: u16 = 0o100000;
pub const S_IFDIR: u16 = 0o040000;
pub const S_IFLNK: u16 = 0o120000;
