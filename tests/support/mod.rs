//! Builds a fresh MINIX v3 image by hand (no `mkfs` exists in this crate —
//! filesystem creation is explicitly out of scope) and returns it mounted.
//!
//! Byte layout mirrors §6 of the on-disk format exactly: superblock at byte
//! 1024, then inode bitmap / zone bitmap / inode table / data zones in that
//! block order. The root directory is seeded directly into the image bytes
//! since `Fs::mount` only ever loads an already-formatted tree.

use std::io::{Seek, SeekFrom, Write};

use minixfs::{
	Fs, MountOptions, DIRENT_NAME_MAX, DIRENT_SIZE, IMAP_START_BLOCK, INODE_SIZE, MAGIC,
	ROOT_INODE, S_IFDIR, SUPERBLOCK_OFFSET,
};

pub struct Image {
	pub block_size: u32,
	pub first_data_zone: u32,
}

fn encode_dirent(buf: &mut [u8], ino: u32, name: &str) {
	assert!(name.len() <= DIRENT_NAME_MAX);
	buf[0..4].copy_from_slice(&ino.to_le_bytes());
	buf[4..4 + name.len()].copy_from_slice(name.as_bytes());
}

/// Writes a fresh image with `ninodes` inodes and `zones` zones at
/// `block_size`, containing only a seeded root directory, into `file`.
/// Returns the geometry a caller needs to compute further block offsets.
pub fn build_image(file: &mut std::fs::File, block_size: u32, ninodes: u32, zones: u32) -> Image {
	build_image_with_max_size(file, block_size, ninodes, zones, u32::MAX)
}

/// Like [`build_image`] but with an explicit `max_size`, for exercising the
/// per-file size ceiling.
pub fn build_image_with_max_size(
	file: &mut std::fs::File,
	block_size: u32,
	ninodes: u32,
	zones: u32,
	max_size: u32,
) -> Image {
	let imap_blocks = (ninodes + 1 + block_size * 8 - 1) / (block_size * 8);
	let zmap_blocks = (zones + block_size * 8 - 1) / (block_size * 8);
	let inode_start = IMAP_START_BLOCK + imap_blocks + zmap_blocks;
	let inodes_per_block = block_size / INODE_SIZE as u32;
	let inode_table_blocks = (ninodes + inodes_per_block - 1) / inodes_per_block;
	let data_start_block = inode_start + inode_table_blocks;
	let first_data_zone = data_start_block;

	let total_blocks = first_data_zone + zones;
	let mut image = vec![0u8; (total_blocks * block_size) as usize];

	// Superblock.
	let mut sb = Vec::with_capacity(32);
	sb.extend_from_slice(&ninodes.to_le_bytes());
	sb.extend_from_slice(&0u16.to_le_bytes());
	sb.extend_from_slice(&(imap_blocks as u16).to_le_bytes());
	sb.extend_from_slice(&(zmap_blocks as u16).to_le_bytes());
	sb.extend_from_slice(&(first_data_zone as u16).to_le_bytes());
	sb.extend_from_slice(&0u16.to_le_bytes()); // log_zone_size
	sb.extend_from_slice(&0u16.to_le_bytes());
	sb.extend_from_slice(&max_size.to_le_bytes());
	sb.extend_from_slice(&zones.to_le_bytes());
	sb.extend_from_slice(&MAGIC.to_le_bytes());
	sb.extend_from_slice(&0u16.to_le_bytes());
	sb.extend_from_slice(&(block_size as u16).to_le_bytes());
	sb.push(3u8); // disk_version
	sb.push(0u8);
	let off = SUPERBLOCK_OFFSET as usize;
	image[off..off + sb.len()].copy_from_slice(&sb);

	// Inode bitmap: mark ROOT_INODE allocated.
	let imap_off = (IMAP_START_BLOCK * block_size) as usize;
	image[imap_off] |= 1 << (ROOT_INODE % 8);

	// Zone bitmap: mark the root directory's single data zone allocated.
	let zmap_off = ((IMAP_START_BLOCK + imap_blocks) * block_size) as usize;
	let root_zone_byte = (first_data_zone / 8) as usize;
	let root_zone_bit = first_data_zone % 8;
	image[zmap_off + root_zone_byte] |= 1 << root_zone_bit;

	// Root inode record (#1): a directory with "." and ".." only.
	let root_inode_off = (inode_start * block_size) as usize;
	let mut raw = [0u8; INODE_SIZE];
	raw[0..2].copy_from_slice(&(S_IFDIR | 0o755u16).to_le_bytes());
	raw[2..4].copy_from_slice(&2u16.to_le_bytes()); // nlinks
	raw[4..6].copy_from_slice(&0u16.to_le_bytes()); // uid
	raw[6..8].copy_from_slice(&0u16.to_le_bytes()); // gid
	raw[8..12].copy_from_slice(&(2u32 * DIRENT_SIZE as u32).to_le_bytes()); // size
	raw[12..16].copy_from_slice(&1_700_000_000u32.to_le_bytes()); // atime
	raw[16..20].copy_from_slice(&1_700_000_000u32.to_le_bytes()); // mtime
	raw[20..24].copy_from_slice(&1_700_000_000u32.to_le_bytes()); // ctime
	raw[24..28].copy_from_slice(&first_data_zone.to_le_bytes()); // zone[0]
	image[root_inode_off..root_inode_off + INODE_SIZE].copy_from_slice(&raw);

	// Root directory contents: "." and ".." both pointing at inode 1.
	let data_off = (first_data_zone * block_size) as usize;
	let mut dot = [0u8; DIRENT_SIZE];
	encode_dirent(&mut dot, ROOT_INODE, ".");
	let mut dotdot = [0u8; DIRENT_SIZE];
	encode_dirent(&mut dotdot, ROOT_INODE, "..");
	image[data_off..data_off + DIRENT_SIZE].copy_from_slice(&dot);
	image[data_off + DIRENT_SIZE..data_off + 2 * DIRENT_SIZE].copy_from_slice(&dotdot);

	file.seek(SeekFrom::Start(0)).unwrap();
	file.write_all(&image).unwrap();
	file.flush().unwrap();

	Image { block_size, first_data_zone }
}

/// Builds a small (4096-zone) fresh image backed by a real temp file and
/// mounts it read-write.
pub fn mount_fresh() -> Fs<std::fs::File> {
	let tmp = tempfile::NamedTempFile::new().unwrap();
	let mut file = tmp.reopen().unwrap();
	build_image(&mut file, 1024, 64, 4096);
	Fs::mount(file, MountOptions::default()).unwrap()
}

/// Builds a larger (8192-zone) image so a multi-megabyte write can cross
/// into single- and double-indirect zones.
pub fn mount_fresh_large() -> Fs<std::fs::File> {
	let tmp = tempfile::NamedTempFile::new().unwrap();
	let mut file = tmp.reopen().unwrap();
	build_image(&mut file, 1024, 64, 8192);
	Fs::mount(file, MountOptions::default()).unwrap()
}

/// Builds a fresh image whose superblock advertises `max_size`, for testing
/// the per-file size ceiling.
pub fn mount_fresh_with_max_size(max_size: u32) -> Fs<std::fs::File> {
	let tmp = tempfile::NamedTempFile::new().unwrap();
	let mut file = tmp.reopen().unwrap();
	build_image_with_max_size(&mut file, 1024, 64, 4096, max_size);
	Fs::mount(file, MountOptions::default()).unwrap()
}
