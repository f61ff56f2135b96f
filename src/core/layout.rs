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

//! On-disk layout: the superblock, the inode format, and the geometry
//! formulas that derive block counts from raw device size. Everything here is
//! big-endian, unlike the native-endian structures a local filesystem like
//! ext2 would use, since this layout has to be the same on any host.

use crate::error::{EngineError, Result};

/// The logical block size used by every front end, and by `init()` when
/// formatting a fresh volume: a fixed power of two, a multiple of any
/// physical sector size this engine is expected to run on.
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// Magic number stamped in the first four bytes of block 0: `SFSE`.
pub const MAGIC: u32 = 0x5346_5345;

/// Size in bytes of the superblock's meaningful header; the rest of block 0 is
/// zero padding up to `B`.
pub const SUPERBLOCK_HEADER_LEN: usize = 16;

/// Size in bytes of one inode slot.
pub const INODE_SIZE: usize = 64;

/// Maximum length in bytes of a file name.
pub const NAME_LEN: usize = 32;

/// Number of direct block pointers carried by an inode.
pub const DIRECT_POINTERS: usize = 4;

/// Size in bytes of one block pointer (big-endian u32).
pub const POINTER_SIZE: usize = 4;

/// A 0-valued pointer denotes "absent".
pub const NULL_POINTER: u32 = 0;

/// Hard cap on an inode's `size` field: 1 TiB. A live inode whose stored size
/// exceeds this is treated as corrupt rather than decoded, regardless of what
/// the rest of the slot contains.
pub const MAX_INODE_SIZE: u64 = 1u64 << 40;

/// Derived geometry for a device of `device_blocks` logical blocks of size `B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Total number of logical blocks the device holds, `N`.
    pub total_blocks: u64,
    /// Number of inode-table blocks, `Ni`.
    pub inode_blocks: u64,
    /// Number of bitmap blocks, `Nb`.
    pub bitmap_blocks: u64,
    /// First data block index, `1 + Nb + Ni`.
    pub data_offset: u64,
}

impl Geometry {
    /// Derives geometry from a raw device byte size and the logical block size.
    ///
    /// `N = floor(device_bytes / B)`, `Ni = round((N-1)/100000)`,
    /// `Nb = floor((N - Ni - 1) / (B*8))`, `DataOffset = 1 + Nb + Ni`. Geometry
    /// is always derived from the device, never stored.
    pub fn derive(device_bytes: u64, block_size: u32) -> Self {
        let b = block_size as u64;
        let total_blocks = device_bytes / b;
        let inode_blocks = round_div(total_blocks.saturating_sub(1), 100_000);
        let bitmap_blocks =
            (total_blocks.saturating_sub(inode_blocks).saturating_sub(1)) / (b * 8);
        let data_offset = 1 + bitmap_blocks + inode_blocks;
        Self {
            total_blocks,
            inode_blocks,
            bitmap_blocks,
            data_offset,
        }
    }

    /// Number of inode slots per inode-table block.
    pub fn inodes_per_block(&self, block_size: u32) -> u64 {
        block_size as u64 / INODE_SIZE as u64
    }

    /// Maximum number of live inodes this geometry can hold: `Ni * B/64`.
    pub fn max_inodes(&self, block_size: u32) -> u64 {
        self.inode_blocks * self.inodes_per_block(block_size)
    }

    /// Maximum file size representable by the direct/indirect/double-indirect
    /// pointer scheme: `B * (4 + B/4 + (B/4)^2)`.
    pub fn max_file_size(block_size: u32) -> u64 {
        let b = block_size as u64;
        let pointers_per_block = b / POINTER_SIZE as u64;
        b * (DIRECT_POINTERS as u64 + pointers_per_block + pointers_per_block * pointers_per_block)
    }
}

/// Rounds `a / b` to the nearest integer (ties round up), matching the
/// reference formula `round((N-1)/100000)`.
fn round_div(a: u64, b: u64) -> u64 {
    (a + b / 2) / b
}

/// The parsed contents of block 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// Number of bitmap blocks, `Nb`.
    pub bitmap_blocks: u32,
    /// Number of inode-table blocks, `Ni`.
    pub inode_blocks: u32,
    /// Advisory count of currently-live inodes. Not required for correctness;
    /// recomputed on demand for `usage()` rather than trusted.
    pub inode_count: u32,
}

impl Superblock {
    /// Builds a fresh superblock for the given geometry, with a zero live-inode count.
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            bitmap_blocks: geometry.bitmap_blocks as u32,
            inode_blocks: geometry.inode_blocks as u32,
            inode_count: 0,
        }
    }

    /// Encodes the superblock into a zero-padded block of `block_size` bytes.
    pub fn encode(&self, block_size: u32) -> Vec<u8> {
        let mut block = vec![0u8; block_size as usize];
        block[0..4].copy_from_slice(&MAGIC.to_be_bytes());
        block[4..8].copy_from_slice(&self.bitmap_blocks.to_be_bytes());
        block[8..12].copy_from_slice(&self.inode_blocks.to_be_bytes());
        block[12..16].copy_from_slice(&self.inode_count.to_be_bytes());
        block
    }

    /// Parses a superblock out of block 0's raw bytes.
    ///
    /// Returns `Err(EngineError::NotFormatted)` if the magic does not match,
    /// which the caller treats as "this device needs initializing" rather
    /// than a fatal condition.
    pub fn decode(block: &[u8]) -> Result<Self> {
        if block.len() < SUPERBLOCK_HEADER_LEN {
            return Err(EngineError::NotFormatted);
        }
        let magic = u32::from_be_bytes(block[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(EngineError::NotFormatted);
        }
        let bitmap_blocks = u32::from_be_bytes(block[4..8].try_into().unwrap());
        let inode_blocks = u32::from_be_bytes(block[8..12].try_into().unwrap());
        let inode_count = u32::from_be_bytes(block[12..16].try_into().unwrap());
        Ok(Self {
            bitmap_blocks,
            inode_blocks,
            inode_count,
        })
    }

    /// Rewrites only the advisory inode count (bytes 12..16), leaving the rest
    /// of an already-encoded block untouched.
    pub fn patch_inode_count(block: &mut [u8], inode_count: u32) {
        block[12..16].copy_from_slice(&inode_count.to_be_bytes());
    }
}

/// An inode: a file's size, name, and block-pointer tree, plus its slot
/// position within the inode table (not part of the on-disk layout, but
/// needed to write the inode back without a second table scan).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    /// Slot index within the inode table (`0..Ni*inodes_per_block`), not disk bytes.
    pub slot: u64,
    /// Whether this slot currently holds a live file.
    pub valid: bool,
    /// File size in bytes.
    pub size: u64,
    /// File name, UTF-8, at most `NAME_LEN` bytes.
    pub name: String,
    /// Direct data-block pointers; 0 means absent.
    pub direct: [u32; DIRECT_POINTERS],
    /// Single-indirect pointer-block pointer; 0 means absent.
    pub indirect: u32,
    /// Double-indirect pointer-block pointer; 0 means absent.
    pub double_indirect: u32,
}

impl Inode {
    /// Builds a fresh, empty, valid inode for `name` at the given slot.
    pub fn new(slot: u64, name: &str) -> Result<Self> {
        validate_name(name)?;
        Ok(Self {
            slot,
            valid: true,
            size: 0,
            name: name.to_string(),
            direct: [0; DIRECT_POINTERS],
            indirect: 0,
            double_indirect: 0,
        })
    }

    /// Encodes the inode into its fixed 64-byte on-disk representation.
    pub fn encode(&self) -> [u8; INODE_SIZE] {
        let mut buf = [0u8; INODE_SIZE];
        buf[0] = self.valid as u8;
        let size_bytes = self.size.to_be_bytes();
        buf[1..8].copy_from_slice(&size_bytes[1..8]);
        let name_bytes = self.name.as_bytes();
        buf[8..8 + name_bytes.len()].copy_from_slice(name_bytes);
        for (i, ptr) in self.direct.iter().enumerate() {
            let off = 40 + i * POINTER_SIZE;
            buf[off..off + POINTER_SIZE].copy_from_slice(&ptr.to_be_bytes());
        }
        buf[56..60].copy_from_slice(&self.indirect.to_be_bytes());
        buf[60..64].copy_from_slice(&self.double_indirect.to_be_bytes());
        buf
    }

    /// Parses an inode out of a 64-byte slot at table position `slot`.
    ///
    /// Returns `None` for a malformed slot (e.g. a size field that decodes to
    /// zero on a live inode, or a name that is not valid UTF-8) — the
    /// directory scan skips such slots silently rather than failing the mount.
    pub fn decode(slot: u64, raw: &[u8; INODE_SIZE]) -> Option<Self> {
        let valid = match raw[0] {
            0 => false,
            1 => true,
            _ => return None,
        };
        let mut size_bytes = [0u8; 8];
        size_bytes[1..8].copy_from_slice(&raw[1..8]);
        let size = u64::from_be_bytes(size_bytes);
        if valid && (size == 0 || size > MAX_INODE_SIZE) {
            return None;
        }
        let name_end = raw[8..8 + NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        let name = std::str::from_utf8(&raw[8..8 + name_end]).ok()?.to_string();
        if valid && validate_name(&name).is_err() {
            return None;
        }
        let mut direct = [0u32; DIRECT_POINTERS];
        for (i, ptr) in direct.iter_mut().enumerate() {
            let off = 40 + i * POINTER_SIZE;
            *ptr = u32::from_be_bytes(raw[off..off + POINTER_SIZE].try_into().unwrap());
        }
        let indirect = u32::from_be_bytes(raw[56..60].try_into().unwrap());
        let double_indirect = u32::from_be_bytes(raw[60..64].try_into().unwrap());
        Some(Self {
            slot,
            valid,
            size,
            name,
            direct,
            indirect,
            double_indirect,
        })
    }
}

/// Validates a candidate file name: non-empty, at most `NAME_LEN` UTF-8
/// bytes, and free of interior NULs.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.as_bytes().len() > NAME_LEN || name.contains('\0') {
        return Err(EngineError::InvalidName);
    }
    Ok(())
}

/// Decodes a pointer block into its `block_size / 4` big-endian pointers.
pub fn decode_pointer_block(block: &[u8]) -> Vec<u32> {
    block
        .chunks_exact(POINTER_SIZE)
        .map(|c| u32::from_be_bytes(c.try_into().unwrap()))
        .collect()
}

/// Encodes a slice of pointers into a zero-padded pointer block of `block_size` bytes.
pub fn encode_pointer_block(pointers: &[u32], block_size: u32) -> Vec<u8> {
    let mut block = vec![0u8; block_size as usize];
    for (i, ptr) in pointers.iter().enumerate() {
        let off = i * POINTER_SIZE;
        block[off..off + POINTER_SIZE].copy_from_slice(&ptr.to_be_bytes());
    }
    block
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn geometry_matches_reference_formula() {
        // A 1 GiB device at B=4096: N = 262144.
        let geometry = Geometry::derive(1024 * 1024 * 1024, 4096);
        assert_eq!(geometry.total_blocks, 262_144);
        assert_eq!(geometry.inode_blocks, round_div(262_143, 100_000));
        let expected_bitmap =
            (262_144 - geometry.inode_blocks - 1) / (4096 * 8);
        assert_eq!(geometry.bitmap_blocks, expected_bitmap);
        assert_eq!(
            geometry.data_offset,
            1 + geometry.bitmap_blocks + geometry.inode_blocks
        );
    }

    #[test]
    fn max_file_size_at_4096() {
        assert_eq!(
            Geometry::max_file_size(4096),
            4096 * (4 + 1024 + 1024 * 1024)
        );
    }

    #[test]
    fn superblock_round_trip() {
        let geometry = Geometry::derive(1024 * 1024 * 1024, 4096);
        let mut sb = Superblock::new(&geometry);
        sb.inode_count = 7;
        let mut encoded = sb.encode(4096);
        assert_eq!(encoded.len(), 4096);
        let decoded = Superblock::decode(&encoded).unwrap();
        assert_eq!(decoded, sb);

        Superblock::patch_inode_count(&mut encoded, 9);
        let patched = Superblock::decode(&encoded).unwrap();
        assert_eq!(patched.inode_count, 9);
        assert_eq!(patched.bitmap_blocks, sb.bitmap_blocks);
    }

    #[test]
    fn bad_magic_is_not_formatted() {
        let block = vec![0u8; 4096];
        assert!(matches!(
            Superblock::decode(&block),
            Err(EngineError::NotFormatted)
        ));
    }

    #[test]
    fn inode_round_trip() {
        let mut inode = Inode::new(3, "hello.txt").unwrap();
        inode.size = 12345;
        inode.direct = [10, 11, 0, 0];
        inode.indirect = 20;
        let encoded = inode.encode();
        let decoded = Inode::decode(3, &encoded).unwrap();
        assert_eq!(decoded.valid, true);
        assert_eq!(decoded.size, 12345);
        assert_eq!(decoded.name, "hello.txt");
        assert_eq!(decoded.direct, [10, 11, 0, 0]);
        assert_eq!(decoded.indirect, 20);
        assert_eq!(decoded.double_indirect, 0);
    }

    #[test]
    fn free_slot_round_trips() {
        let raw = [0u8; INODE_SIZE];
        let decoded = Inode::decode(0, &raw).unwrap();
        assert!(!decoded.valid);
        assert_eq!(decoded.size, 0);
    }

    #[test]
    fn name_too_long_is_rejected() {
        let name = "x".repeat(NAME_LEN + 1);
        assert!(Inode::new(0, &name).is_err());
    }

    #[test]
    fn oversized_live_slot_is_rejected_as_corrupt() {
        let mut inode = Inode::new(4, "big").unwrap();
        inode.size = MAX_INODE_SIZE + 1;
        let encoded = inode.encode();
        assert!(Inode::decode(4, &encoded).is_none());
    }

    #[test]
    fn size_at_the_cap_is_still_accepted() {
        let mut inode = Inode::new(5, "atcap").unwrap();
        inode.size = MAX_INODE_SIZE;
        let encoded = inode.encode();
        let decoded = Inode::decode(5, &encoded).unwrap();
        assert_eq!(decoded.size, MAX_INODE_SIZE);
    }

    #[test]
    fn pointer_block_round_trip() {
        let pointers = vec![1u32, 2, 3, 0, 5];
        let block = encode_pointer_block(&pointers, 4096);
        let decoded = decode_pointer_block(&block);
        assert_eq!(&decoded[..5], &pointers[..]);
        assert!(decoded[5..].iter().all(|&p| p == 0));
    }
}
