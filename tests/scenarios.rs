/*
 * Copyright 2026 The sfse authors
 *
 * This file is part of sfse.
 *
 * sfse is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * sfse is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * sfse. If not, see <https://www.gnu.org/licenses/>.
 */

//! End-to-end scenarios against a disk image, exercising the engine the way a
//! front end does: open, create, read, rename, delete, reset.

use sfse::crypt::SectorCrypt;
use sfse::device::FileDevice;
use sfse::layout::{Geometry, DEFAULT_BLOCK_SIZE};
use sfse::FileSystem;
use std::io::Write;
use std::path::PathBuf;

const IMAGE_SIZE: u64 = 1024 * 1024 * 1024;

struct Image {
    _guard: tempfile::NamedTempFile,
    path: PathBuf,
}

fn image() -> Image {
    let mut f = tempfile::NamedTempFile::new().expect("create scratch image");
    f.as_file()
        .set_len(IMAGE_SIZE)
        .expect("size scratch image");
    f.flush().unwrap();
    let path = f.path().to_path_buf();
    Image { _guard: f, path }
}

fn open_plain(image: &Image) -> FileSystem<FileDevice> {
    let device = FileDevice::open(&image.path, 0).unwrap();
    FileSystem::open(device, DEFAULT_BLOCK_SIZE, None).unwrap()
}

fn open_crypt(image: &Image, password: &str, pin: &str) -> FileSystem<FileDevice> {
    let device = FileDevice::open(&image.path, 0).unwrap();
    let crypt = SectorCrypt::new(password, pin);
    FileSystem::open(device, DEFAULT_BLOCK_SIZE, Some(crypt)).unwrap()
}

fn read_all(fs: &mut FileSystem<FileDevice>, name: &str) -> Vec<u8> {
    let size = fs.file_size(name).unwrap();
    let mut out = Vec::new();
    for block in fs.read_file(name).unwrap() {
        out.extend_from_slice(&block.unwrap());
    }
    out.truncate(size as usize);
    out
}

fn read_all_padded(fs: &mut FileSystem<FileDevice>, name: &str) -> Vec<u8> {
    let mut out = Vec::new();
    for block in fs.read_file(name).unwrap() {
        out.extend_from_slice(&block.unwrap());
    }
    out
}

/// S1: create, list, read, delete on an otherwise-empty volume restores an
/// all-zero bitmap.
#[test]
fn s1_create_list_read_delete_round_trip() {
    let image = image();
    let mut fs = open_plain(&image);

    fs.create_file_from_reader("hello", 2, &b"hi"[..]).unwrap();
    let mut names: Vec<&str> = fs.list().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["hello"]);

    let mut expected = b"hi".to_vec();
    expected.resize(DEFAULT_BLOCK_SIZE as usize, 0);
    assert_eq!(read_all_padded(&mut fs, "hello"), expected);

    fs.delete_file("hello").unwrap();
    assert!(fs.list().collect::<Vec<_>>().is_empty());

    let usage = fs.usage();
    assert_eq!(usage.live_files, 0);
}

/// S2: a file just over one block uses exactly two direct pointers and
/// nothing beyond them.
#[test]
fn s2_two_block_file_uses_only_direct_pointers() {
    let image = image();
    let mut fs = open_plain(&image);
    let payload = vec![0x11u8; DEFAULT_BLOCK_SIZE as usize + 1];
    fs.create_file_from_reader("two_blocks", payload.len() as u64, &payload[..])
        .unwrap();
    assert_eq!(read_all(&mut fs, "two_blocks"), payload);
    assert_eq!(fs.file_size("two_blocks").unwrap(), payload.len() as u64);
}

/// S3: a file spanning 5 blocks spills exactly one pointer into the indirect
/// block.
#[test]
fn s3_five_block_file_spills_one_indirect_pointer() {
    let image = image();
    let mut fs = open_plain(&image);
    let payload = vec![0x22u8; 5 * DEFAULT_BLOCK_SIZE as usize];
    fs.create_file_from_reader("ind", payload.len() as u64, &payload[..])
        .unwrap();
    assert_eq!(read_all(&mut fs, "ind"), payload);
}

/// S4: a file big enough to need the double-indirect block round-trips
/// across all three pointer tiers.
#[test]
fn s4_double_indirect_file_round_trips() {
    let image = image();
    let mut fs = open_plain(&image);
    let geometry = Geometry::derive(IMAGE_SIZE, DEFAULT_BLOCK_SIZE);
    let pointers_per_block = (DEFAULT_BLOCK_SIZE / 4) as u64;
    let _ = geometry;
    let blocks = 4 + pointers_per_block + 1;
    let payload = vec![0x33u8; (blocks * DEFAULT_BLOCK_SIZE as u64) as usize];
    fs.create_file_from_reader("dind", payload.len() as u64, &payload[..])
        .unwrap();
    assert_eq!(read_all(&mut fs, "dind"), payload);
}

/// S5: rename preserves the inode and its contents; the old name is gone.
#[test]
fn s5_rename_preserves_contents_and_drops_old_name() {
    let image = image();
    let mut fs = open_plain(&image);
    fs.create_file_from_reader("a", 1, &b"x"[..]).unwrap();
    fs.rename_file("a", "b").unwrap();

    let mut expected = b"x".to_vec();
    expected.resize(DEFAULT_BLOCK_SIZE as usize, 0);
    assert_eq!(read_all_padded(&mut fs, "b"), expected);
    assert!(fs.read_file("a").is_err());
}

/// S6: opening the same volume with the wrong PIN mounts cleanly (the
/// superblock's magic and geometry are unencrypted) but yields a directory
/// that does not contain the original name, and any decrypted contents are
/// garbage rather than the original plaintext. No reformat occurs.
#[test]
fn s6_wrong_pin_mounts_with_garbled_directory_not_a_reformat() {
    let image = image();
    {
        let mut fs = open_crypt(&image, "correct horse", "4321");
        fs.create_file_from_reader("secret", 4, &b"data"[..])
            .unwrap();
    }

    let mut reopened = open_crypt(&image, "correct horse", "0000");
    let names: Vec<&str> = reopened.list().collect();
    assert!(!names.contains(&"secret"));

    // The volume was not reformatted: re-opening with the correct credentials
    // still recovers the original file untouched.
    let mut reopened_correctly = open_crypt(&image, "correct horse", "4321");
    assert_eq!(read_all(&mut reopened_correctly, "secret"), b"data");
}

/// Property 5 (bitmap/inode coherence) and property 9 (reset purges) exercised
/// together: a handful of creates and deletes, then reset, yields an empty
/// directory and an all-free bitmap, and the volume still opens afterward.
#[test]
fn bitmap_and_directory_are_consistent_across_reset_and_reopen() {
    let image = image();
    {
        let mut fs = open_plain(&image);
        fs.create_file_from_reader("one", 3, &b"one"[..]).unwrap();
        fs.create_file_from_reader("two", 3, &b"two"[..]).unwrap();
        fs.delete_file("one").unwrap();
        fs.reset().unwrap();
        assert!(fs.list().collect::<Vec<_>>().is_empty());
    }

    let mut reopened = open_plain(&image);
    assert!(reopened.list().collect::<Vec<_>>().is_empty());
    reopened
        .create_file_from_reader("fresh", 5, &b"fresh"[..])
        .unwrap();
    assert_eq!(read_all(&mut reopened, "fresh"), b"fresh");
}
