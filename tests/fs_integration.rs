//! End-to-end scenarios against a real temp-file-backed image, driving the
//! `Fs` facade the way a host bridge would. Mirrors the literal scenarios a
//! fresh MINIX v3 mount is expected to satisfy.

mod support;

use minixfs::{ErrorKind, OpenFlags, OwnerUpdate, TimeUpdate};

#[test]
fn fresh_image_has_only_dot_entries_in_root() {
	let mut fs = support::mount_fresh();
	let entries = fs.list_dir("/").unwrap();
	let names: Vec<&str> = entries.iter().map(|e| e.entry.name.as_str()).collect();
	assert!(names.contains(&"."));
	assert!(names.contains(&".."));
	assert_eq!(entries.len(), 2);
	assert!(entries.iter().all(|e| e.attrs.mode & minixfs::S_IFMT == minixfs::S_IFDIR));
	assert!(entries.iter().all(|e| e.attrs.ino == e.entry.ino));

	let attrs = fs.get_attr("/").unwrap();
	assert_eq!(attrs.mode & minixfs::S_IFMT, minixfs::S_IFDIR);
	assert_eq!(attrs.nlinks, 2);
}

#[test]
fn create_write_read_round_trip() {
	let mut fs = support::mount_fresh();
	let ino = fs.create("/", "a.txt", 0o644, 1000, 1000).unwrap();
	let listed = fs.list_dir("/").unwrap();
	let a = listed.iter().find(|e| e.entry.name == "a.txt").unwrap();
	assert_eq!(a.attrs.ino, ino);
	assert_eq!(a.attrs.uid, 1000);

	let n = fs.write("/a.txt", b"hello", 0).unwrap();
	assert_eq!(n, 5);

	let mut buf = [0u8; 5];
	let n = fs.read("/a.txt", &mut buf, 0).unwrap();
	assert_eq!(n, 5);
	assert_eq!(&buf, b"hello");

	let attrs = fs.get_attr("/a.txt").unwrap();
	assert_eq!(attrs.ino, ino);
	assert_eq!(attrs.size, 5);
	assert_eq!(attrs.nlinks, 1);
}

#[test]
fn write_past_eof_leaves_a_zero_filled_hole() {
	let mut fs = support::mount_fresh();
	fs.create("/", "sparse.bin", 0o644, 0, 0).unwrap();
	fs.write("/sparse.bin", b"end", 10).unwrap();

	let mut buf = [0xFFu8; 10];
	let n = fs.read("/sparse.bin", &mut buf, 0).unwrap();
	assert_eq!(n, 10);
	assert_eq!(&buf, &[0u8; 10]);

	let mut tail = [0u8; 3];
	fs.read("/sparse.bin", &mut tail, 10).unwrap();
	assert_eq!(&tail, b"end");
}

#[test]
fn read_past_eof_returns_zero_bytes() {
	let mut fs = support::mount_fresh();
	fs.create("/", "empty.txt", 0o644, 0, 0).unwrap();
	let mut buf = [0u8; 16];
	let n = fs.read("/empty.txt", &mut buf, 100).unwrap();
	assert_eq!(n, 0);
}

#[test]
fn mkdir_rmdir_round_trip_and_non_empty_rejection() {
	let mut fs = support::mount_fresh();
	fs.mkdir("/d", 0o755, 0, 0).unwrap();
	let entries = fs.list_dir("/d").unwrap();
	assert_eq!(entries.len(), 2);

	fs.rmdir("/d").unwrap();
	assert_eq!(fs.get_attr("/d").unwrap_err().kind(), ErrorKind::FileNotFound);
	assert_eq!(fs.rmdir("/d").unwrap_err().kind(), ErrorKind::FileNotFound);

	fs.mkdir("/d", 0o755, 0, 0).unwrap();
	fs.create("/d/x", "unused", 0o644, 0, 0).ok();
	fs.create("/d", "x", 0o644, 0, 0).unwrap();
	assert_eq!(fs.rmdir("/d").unwrap_err().kind(), ErrorKind::DirectoryNotEmpty);
}

#[test]
fn hard_link_then_unlink_keeps_data_and_link_counts() {
	let mut fs = support::mount_fresh();
	fs.create("/", "a.txt", 0o644, 0, 0).unwrap();
	fs.write("/a.txt", b"payload", 0).unwrap();
	fs.link("/a.txt", "/b.txt").unwrap();

	assert_eq!(fs.get_attr("/a.txt").unwrap().nlinks, 2);
	assert_eq!(fs.get_attr("/b.txt").unwrap().nlinks, 2);
	assert_eq!(fs.get_attr("/a.txt").unwrap().ino, fs.get_attr("/b.txt").unwrap().ino);

	fs.unlink("/a.txt").unwrap();
	assert_eq!(fs.get_attr("/b.txt").unwrap().nlinks, 1);
	let mut buf = [0u8; 7];
	fs.read("/b.txt", &mut buf, 0).unwrap();
	assert_eq!(&buf, b"payload");
}

#[test]
fn unlink_while_open_defers_reap_until_close() {
	let mut fs = support::mount_fresh();
	fs.create("/", "a.txt", 0o644, 0, 0).unwrap();
	fs.write("/a.txt", b"still here", 0).unwrap();

	let before = fs.stat_fs().free_inodes;
	let handle = fs.open("/a.txt", OpenFlags::default()).unwrap();
	fs.unlink("/a.txt").unwrap();
	assert_eq!(fs.get_attr("/a.txt").unwrap_err().kind(), ErrorKind::FileNotFound);

	let mut buf = [0u8; 10];
	let n = fs.read(handle, &mut buf, 0).unwrap();
	assert_eq!(n, 10);
	assert_eq!(&buf, b"still here");
	assert_eq!(fs.stat_fs().free_inodes, before);

	fs.close(handle).unwrap();
	assert_eq!(fs.stat_fs().free_inodes, before + 1);
}

#[test]
fn rename_moves_entry_and_preserves_inode() {
	let mut fs = support::mount_fresh();
	let ino = fs.create("/", "a.txt", 0o644, 0, 0).unwrap();
	fs.mkdir("/sub", 0o755, 0, 0).unwrap();

	fs.rename("/a.txt", "/sub/moved.txt", true).unwrap();
	assert_eq!(fs.get_attr("/a.txt").unwrap_err().kind(), ErrorKind::FileNotFound);
	let moved = fs.get_attr("/sub/moved.txt").unwrap();
	assert_eq!(moved.ino, ino);
	assert_eq!(moved.nlinks, 1);
}

#[test]
fn rename_directory_into_own_subtree_is_rejected() {
	let mut fs = support::mount_fresh();
	fs.mkdir("/parent", 0o755, 0, 0).unwrap();
	fs.mkdir("/parent/child", 0o755, 0, 0).unwrap();
	let err = fs.rename("/parent", "/parent/child/moved", true).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::MoveToSubdir);
}

#[test]
fn symlink_resolves_and_readlink_returns_raw_target() {
	let mut fs = support::mount_fresh();
	fs.create("/", "real.txt", 0o644, 0, 0).unwrap();
	fs.write("/real.txt", b"via link", 0).unwrap();
	fs.create_symlink("/link", "/real.txt", 0, 0).unwrap();

	assert_eq!(fs.read_link("/link").unwrap(), "/real.txt");
	let mut buf = [0u8; 8];
	fs.read("/link", &mut buf, 0).unwrap();
	assert_eq!(&buf, b"via link");
}

#[test]
fn chmod_chown_utimens_update_attrs() {
	let mut fs = support::mount_fresh();
	fs.create("/", "f", 0o644, 0, 0).unwrap();

	fs.chmod("/f", 0o600).unwrap();
	assert_eq!(fs.get_attr("/f").unwrap().mode & !minixfs::S_IFMT, 0o600);

	fs.chown("/f", OwnerUpdate { uid: Some(42), gid: None }).unwrap();
	let attrs = fs.get_attr("/f").unwrap();
	assert_eq!(attrs.uid, 42);
	assert_eq!(attrs.gid, 0);

	fs.utimens("/f", TimeUpdate::Set(123), TimeUpdate::Omit).unwrap();
	assert_eq!(fs.get_attr("/f").unwrap().atime, 123);
}

#[test]
fn read_only_mount_rejects_mutation() {
	let tmp = tempfile::NamedTempFile::new().unwrap();
	let mut file = tmp.reopen().unwrap();
	support::build_image(&mut file, 1024, 64, 4096);
	let mut fs = minixfs::Fs::mount(file, minixfs::MountOptions { read_only: true, ..Default::default() }).unwrap();

	assert_eq!(fs.create("/", "x", 0o644, 0, 0).unwrap_err().kind(), ErrorKind::ReadOnlyFs);
	assert_eq!(fs.list_dir("/").unwrap().len(), 2);
}

#[test]
fn truncate_to_zero_frees_every_data_zone() {
	let mut fs = support::mount_fresh();
	fs.create("/", "big.bin", 0o644, 0, 0).unwrap();
	let before = fs.stat_fs().free_data_blocks;

	let chunk = vec![0x5Au8; 64 * 1024];
	fs.write("/big.bin", &chunk, 0).unwrap();
	assert!(fs.stat_fs().free_data_blocks < before);

	fs.truncate("/big.bin", 0).unwrap();
	assert_eq!(fs.stat_fs().free_data_blocks, before);
	assert_eq!(fs.get_attr("/big.bin").unwrap().size, 0);
}

#[test]
fn large_write_spans_direct_single_and_double_indirect_zones() {
	let mut fs = support::mount_fresh_large();
	fs.create("/", "huge.bin", 0o644, 0, 0).unwrap();

	let size = 5 * 1024 * 1024;
	let mut data = vec![0u8; size];
	for (i, b) in data.iter_mut().enumerate() {
		*b = (i % 251) as u8;
	}
	let written = fs.write("/huge.bin", &data, 0).unwrap();
	assert_eq!(written, size);
	assert_eq!(fs.get_attr("/huge.bin").unwrap().size as usize, size);

	let mut readback = vec![0u8; size];
	let n = fs.read("/huge.bin", &mut readback, 0).unwrap();
	assert_eq!(n, size);
	assert_eq!(readback, data);

	let before_free = fs.stat_fs().free_data_blocks;
	fs.truncate("/huge.bin", 0).unwrap();
	assert!(fs.stat_fs().free_data_blocks > before_free);
}

#[test]
fn write_exactly_at_max_size_accepted_one_byte_more_rejected() {
	let mut fs = support::mount_fresh_with_max_size(100);
	fs.create("/", "capped.bin", 0o644, 0, 0).unwrap();

	let exact = vec![0x11u8; 100];
	let n = fs.write("/capped.bin", &exact, 0).unwrap();
	assert_eq!(n, 100);
	assert_eq!(fs.get_attr("/capped.bin").unwrap().size, 100);

	let err = fs.write("/capped.bin", b"x", 100).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::InvalidFileOffset);

	let err = fs.write("/capped.bin", &vec![0u8; 101], 0).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::InvalidFileOffset);
}

#[test]
fn list_dir_range_pages_through_entries() {
	let mut fs = support::mount_fresh();
	for name in ["a", "b", "c", "d"] {
		fs.create("/", name, 0o644, 0, 0).unwrap();
	}

	let all = fs.list_dir("/").unwrap();
	assert_eq!(all.len(), 6); // "." ".." + 4 files

	let page = fs.list_dir_range("/", 2, 2).unwrap();
	assert_eq!(page.len(), 2);
	assert_eq!(page, all[2..4]);

	let tail = fs.list_dir_range("/", 5, 10).unwrap();
	assert_eq!(tail.len(), 1);
}

#[test]
fn name_length_boundary() {
	let mut fs = support::mount_fresh();
	let ok_name = "a".repeat(60);
	fs.create("/", &ok_name, 0o644, 0, 0).unwrap();

	let too_long = "a".repeat(61);
	let err = fs.create("/", &too_long, 0o644, 0, 0).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::NameLengthExceeded);
}
