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

//! The filesystem engine: owns the on-disk layout, the directory and bitmap
//! caches, and the file-level operations (create, read, delete, rename,
//! reset).
//!
//! Every public operation runs to completion before another may start; the
//! engine is single-threaded and not reentrant, matching the single open
//! device handle it holds.

use crate::bitmap::{BitmapCache, BlockIo};
use crate::crypt::SectorCrypt;
use crate::device::BlockDevice;
use crate::error::{EngineError, Result};
use crate::layout::{
    decode_pointer_block, encode_pointer_block, validate_name, Geometry, Inode, Superblock,
    DIRECT_POINTERS, INODE_SIZE, POINTER_SIZE,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A snapshot of volume usage, recomputed on demand rather than cached: the
/// superblock's inode count is advisory only.
#[derive(Debug, Clone, Copy)]
pub struct Usage {
    /// Total device capacity addressable by the engine, in bytes.
    pub total_bytes: u64,
    /// Number of currently live files.
    pub live_files: u64,
    /// Maximum number of live files the inode table can hold.
    pub max_files: u64,
    /// Maximum size of a single file.
    pub max_file_size: u64,
}

/// A plaintext-block view of a device, wrapping the sector crypt layer when
/// one is configured. Borrows only the device and crypt fields of a
/// [`FileSystem`] so it can be used alongside a disjoint borrow of its
/// bitmap cache.
struct DeviceIo<'a, D: BlockDevice> {
    device: &'a mut D,
    crypt: Option<&'a SectorCrypt>,
    block_size: u32,
}

impl<D: BlockDevice> BlockIo for DeviceIo<'_, D> {
    fn read_block(&mut self, index: u64) -> Result<Vec<u8>> {
        let raw = self.device.read_block(index, self.block_size)?;
        match self.crypt {
            Some(c) => c.decrypt_block(index as u32, &raw),
            None => Ok(raw),
        }
    }

    fn write_block(&mut self, index: u64, data: &[u8]) -> Result<()> {
        let out = match self.crypt {
            Some(c) => c.encrypt_block(index as u32, data)?,
            None => data.to_vec(),
        };
        self.device.write_block(index, &out)
    }
}

/// Builds a [`DeviceIo`] borrowing only `$self.device`/`$self.crypt`, leaving
/// other fields (notably `bitmap`) free to be borrowed in the same
/// expression. A function cannot do this: a method taking `&mut self` would
/// force the borrow checker to assume the whole of `self` is held live.
macro_rules! device_io {
    ($self:expr) => {
        DeviceIo {
            device: &mut $self.device,
            crypt: $self.crypt.as_ref(),
            block_size: $self.block_size,
        }
    };
}

/// An open filesystem volume.
pub struct FileSystem<D: BlockDevice> {
    device: D,
    crypt: Option<SectorCrypt>,
    block_size: u32,
    geometry: Geometry,
    directory: HashMap<String, Inode>,
    bitmap: BitmapCache,
    live_inode_count: u64,
}

impl<D: BlockDevice> FileSystem<D> {
    /// Opens (mounting an existing volume) or initializes (formatting a fresh
    /// one) the filesystem on `device`.
    ///
    /// `crypt` is `None` only for the internal plain/diagnostic mode; every
    /// user-facing path always supplies one.
    pub fn open(device: D, block_size: u32, crypt: Option<SectorCrypt>) -> Result<Self> {
        let skip_bytes = device.skip() * block_size as u64;
        let usable_bytes = device.geometry().byte_size.saturating_sub(skip_bytes);
        let geometry = Geometry::derive(usable_bytes, block_size);
        let mut fs = Self {
            device,
            crypt,
            block_size,
            geometry,
            directory: HashMap::new(),
            bitmap: BitmapCache::new(block_size, geometry.data_offset),
            live_inode_count: 0,
        };
        let block0 = fs.read_raw(0)?;
        match Superblock::decode(&block0) {
            Ok(sb) => {
                fs.live_inode_count = sb.inode_count as u64;
                fs.rebuild_directory()?;
            }
            Err(EngineError::NotFormatted) => fs.init()?,
            Err(e) => return Err(e),
        }
        Ok(fs)
    }

    /// Returns the logical block size this volume was opened with.
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Returns the derived device geometry.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Writes a fresh superblock and zeroes every block before the data
    /// region, discarding any cached state.
    fn init(&mut self) -> Result<()> {
        let sb = Superblock::new(&self.geometry);
        let encoded = sb.encode(self.block_size);
        self.write_raw(0, &encoded)?;
        let zero = vec![0u8; self.block_size as usize];
        for block in 1..self.geometry.data_offset {
            if crate::signal::take_interrupt() {
                return Err(EngineError::Interrupted);
            }
            self.write_raw(block, &zero)?;
        }
        self.live_inode_count = 0;
        self.directory.clear();
        self.bitmap.clear();
        Ok(())
    }

    /// Reads and, for every block but the superblock, decrypts block `index`.
    ///
    /// Block 0 is kept in the clear. Its only secret-adjacent content is the
    /// advisory inode count, and leaving it unencrypted means a wrong
    /// password or PIN is detectable (garbled names, a refused mount) without
    /// being indistinguishable from "never formatted" — encrypting it would
    /// make every wrong-credential attempt look like a blank device and
    /// reformat over the volume.
    fn read_raw(&mut self, index: u64) -> Result<Vec<u8>> {
        let raw = self.device.read_block(index, self.block_size)?;
        match &self.crypt {
            Some(c) if index != 0 => c.decrypt_block(index as u32, &raw),
            _ => Ok(raw),
        }
    }

    fn write_raw(&mut self, index: u64, data: &[u8]) -> Result<()> {
        let out = match &self.crypt {
            Some(c) if index != 0 => c.encrypt_block(index as u32, data)?,
            _ => data.to_vec(),
        };
        self.device.write_block(index, &out)
    }

    fn alloc_block(&mut self) -> Result<u64> {
        let total = self.geometry.total_blocks;
        let mut io = device_io!(self);
        self.bitmap.allocate(&mut io, total)
    }

    fn free_block(&mut self, block: u64) -> Result<()> {
        let mut io = device_io!(self);
        self.bitmap.flip_bit(&mut io, block, false)
    }

    fn flush_bitmap(&mut self) -> Result<()> {
        let mut io = device_io!(self);
        self.bitmap.flush(&mut io)
    }

    fn flush_inode_count(&mut self) -> Result<()> {
        let mut block0 = self.read_raw(0)?;
        Superblock::patch_inode_count(&mut block0, self.live_inode_count as u32);
        self.write_raw(0, &block0)
    }

    /// Absolute device block index and byte offset of inode slot `slot`.
    fn inode_location(&self, slot: u64) -> (u64, usize) {
        let per_block = self.geometry.inodes_per_block(self.block_size);
        let block = 1 + self.geometry.bitmap_blocks + slot / per_block;
        let offset = (slot % per_block) as usize * INODE_SIZE;
        (block, offset)
    }

    /// Reads every inode-table slot, in table order. Slots that fail to
    /// decode (never happens for an all-zero free slot, only for corruption)
    /// are reported as an empty free slot rather than propagated as an error,
    /// mirroring the reference scan's "skip silently" policy.
    fn scan_slots(&mut self) -> Result<Vec<Inode>> {
        let per_block = self.geometry.inodes_per_block(self.block_size) as usize;
        let base = 1 + self.geometry.bitmap_blocks;
        let mut out = Vec::with_capacity(self.geometry.inode_blocks as usize * per_block);
        for b in 0..self.geometry.inode_blocks {
            let raw = self.read_raw(base + b)?;
            for i in 0..per_block {
                let slot = b * per_block as u64 + i as u64;
                let offset = i * INODE_SIZE;
                let mut buf = [0u8; INODE_SIZE];
                buf.copy_from_slice(&raw[offset..offset + INODE_SIZE]);
                let inode = Inode::decode(slot, &buf).unwrap_or_else(|| Inode {
                    slot,
                    valid: false,
                    size: 0,
                    name: String::new(),
                    direct: [0; DIRECT_POINTERS],
                    indirect: 0,
                    double_indirect: 0,
                });
                out.push(inode);
            }
        }
        Ok(out)
    }

    fn rebuild_directory(&mut self) -> Result<()> {
        self.directory.clear();
        for inode in self.scan_slots()? {
            if inode.valid {
                self.directory.insert(inode.name.clone(), inode);
            }
        }
        Ok(())
    }

    fn allocate_inode_slot(&mut self) -> Result<u64> {
        for inode in self.scan_slots()? {
            if !inode.valid {
                return Ok(inode.slot);
            }
        }
        Err(EngineError::NoFreeInode)
    }

    fn write_inode(&mut self, inode: &Inode) -> Result<()> {
        let (block, offset) = self.inode_location(inode.slot);
        let mut raw = self.read_raw(block)?;
        raw[offset..offset + INODE_SIZE].copy_from_slice(&inode.encode());
        self.write_raw(block, &raw)
    }

    /// Names of every currently live file, in no particular order.
    pub fn list(&self) -> impl Iterator<Item = &str> {
        self.directory.keys().map(String::as_str)
    }

    /// Size in bytes of the named file.
    pub fn file_size(&self, name: &str) -> Result<u64> {
        self.directory
            .get(name)
            .map(|i| i.size)
            .ok_or(EngineError::FileNotFound)
    }

    /// A snapshot of volume usage.
    pub fn usage(&self) -> Usage {
        Usage {
            total_bytes: self.geometry.total_blocks * self.block_size as u64,
            live_files: self.directory.len() as u64,
            max_files: self.geometry.max_inodes(self.block_size),
            max_file_size: Geometry::max_file_size(self.block_size),
        }
    }

    /// Collects the ordered list of data-block pointers for `inode`, walking
    /// direct, then indirect, then double-indirect pointers.
    ///
    /// The double-indirect outer loop stops on the first zero *outer*
    /// pointer; a historical version of this traversal stopped on a stale
    /// inner pointer left over from the previous outer entry instead, which
    /// could truncate a file early or walk past the end of a partially
    /// filled double-indirect block.
    fn collect_pointers(&mut self, inode: &Inode) -> Result<Vec<u32>> {
        let mut pointers = Vec::new();
        for &d in &inode.direct {
            if d == 0 {
                break;
            }
            pointers.push(d);
        }
        if inode.indirect != 0 {
            let block = self.read_raw(inode.indirect as u64)?;
            for p in decode_pointer_block(&block) {
                if p == 0 {
                    break;
                }
                pointers.push(p);
            }
        }
        if inode.double_indirect != 0 {
            let outer_block = self.read_raw(inode.double_indirect as u64)?;
            for outer in decode_pointer_block(&outer_block) {
                if outer == 0 {
                    break;
                }
                let inner_block = self.read_raw(outer as u64)?;
                for inner in decode_pointer_block(&inner_block) {
                    if inner == 0 {
                        break;
                    }
                    pointers.push(inner);
                }
            }
        }
        Ok(pointers)
    }

    /// Returns a lazy sequence of this file's data blocks, each exactly
    /// `block_size` bytes; the caller trims the final block to
    /// [`file_size`](Self::file_size).
    ///
    /// Cancelling iteration partway through is safe: nothing is mutated.
    pub fn read_file(&mut self, name: &str) -> Result<FileBlocks<'_, D>> {
        let inode = self
            .directory
            .get(name)
            .cloned()
            .ok_or(EngineError::FileNotFound)?;
        let pointers = self.collect_pointers(&inode)?;
        Ok(FileBlocks {
            fs: self,
            pointers: pointers.into_iter(),
        })
    }

    /// Creates a file named `name` from the contents of `source_path`.
    pub fn create_file(&mut self, name: &str, source_path: &Path) -> Result<()> {
        let file = File::open(source_path)?;
        let size = file.metadata()?.len();
        self.create_file_from_reader(name, size, file)
    }

    /// Creates a file named `name` of `size` bytes, streaming its contents
    /// from `reader` in `block_size`-sized chunks.
    pub fn create_file_from_reader<R: Read>(
        &mut self,
        name: &str,
        size: u64,
        mut reader: R,
    ) -> Result<()> {
        validate_name(name)?;
        if self.directory.contains_key(name) {
            return Err(EngineError::DuplicateName);
        }
        let max_size = Geometry::max_file_size(self.block_size);
        if size > max_size {
            return Err(EngineError::TooLarge { size, max: max_size });
        }
        let slot = self.allocate_inode_slot()?;
        let mut inode = Inode::new(slot, name)?;
        inode.size = size;

        let block_size = self.block_size as usize;
        let pointers_per_block = block_size / POINTER_SIZE;
        let mut remaining = size;

        for slot in inode.direct.iter_mut() {
            if crate::signal::take_interrupt() {
                return Err(EngineError::Interrupted);
            }
            let Some(chunk) = read_chunk(&mut reader, &mut remaining, block_size)? else {
                break;
            };
            let block = self.alloc_block()?;
            self.write_raw(block, &chunk)?;
            *slot = block as u32;
        }

        if remaining > 0 {
            let indirect_block = self.alloc_block()?;
            let mut ptrs = vec![0u32; pointers_per_block];
            for slot in ptrs.iter_mut() {
                if crate::signal::take_interrupt() {
                    return Err(EngineError::Interrupted);
                }
                let Some(chunk) = read_chunk(&mut reader, &mut remaining, block_size)? else {
                    break;
                };
                let block = self.alloc_block()?;
                self.write_raw(block, &chunk)?;
                *slot = block as u32;
            }
            self.write_raw(indirect_block, &encode_pointer_block(&ptrs, self.block_size))?;
            inode.indirect = indirect_block as u32;
        }

        if remaining > 0 {
            let double_block = self.alloc_block()?;
            let mut outer_ptrs = vec![0u32; pointers_per_block];
            for outer_slot in outer_ptrs.iter_mut() {
                if remaining == 0 {
                    break;
                }
                if crate::signal::take_interrupt() {
                    return Err(EngineError::Interrupted);
                }
                let inner_block = self.alloc_block()?;
                let mut inner_ptrs = vec![0u32; pointers_per_block];
                for inner_slot in inner_ptrs.iter_mut() {
                    let Some(chunk) = read_chunk(&mut reader, &mut remaining, block_size)? else {
                        break;
                    };
                    let block = self.alloc_block()?;
                    self.write_raw(block, &chunk)?;
                    *inner_slot = block as u32;
                }
                self.write_raw(inner_block, &encode_pointer_block(&inner_ptrs, self.block_size))?;
                *outer_slot = inner_block as u32;
            }
            self.write_raw(double_block, &encode_pointer_block(&outer_ptrs, self.block_size))?;
            inode.double_indirect = double_block as u32;
        }

        if remaining > 0 {
            // Exceeds what direct + indirect + double-indirect can address;
            // should have been caught by the size check above.
            return Err(EngineError::TooLarge { size, max: max_size });
        }

        self.write_inode(&inode)?;
        self.directory.insert(name.to_string(), inode);
        self.live_inode_count += 1;
        self.flush_inode_count()?;
        self.flush_bitmap()?;
        Ok(())
    }

    /// Deletes the named file: clears its bitmap bits, marks its inode slot
    /// free, and removes it from the directory.
    pub fn delete_file(&mut self, name: &str) -> Result<()> {
        let mut inode = self
            .directory
            .get(name)
            .cloned()
            .ok_or(EngineError::FileNotFound)?;

        for &d in &inode.direct {
            if d == 0 {
                break;
            }
            self.free_block(d as u64)?;
        }
        if inode.indirect != 0 {
            let block = self.read_raw(inode.indirect as u64)?;
            for p in decode_pointer_block(&block) {
                if p == 0 {
                    break;
                }
                self.free_block(p as u64)?;
            }
            self.free_block(inode.indirect as u64)?;
        }
        if inode.double_indirect != 0 {
            let outer_block = self.read_raw(inode.double_indirect as u64)?;
            for outer in decode_pointer_block(&outer_block) {
                if outer == 0 {
                    break;
                }
                let inner_block = self.read_raw(outer as u64)?;
                for inner in decode_pointer_block(&inner_block) {
                    if inner == 0 {
                        break;
                    }
                    self.free_block(inner as u64)?;
                }
                self.free_block(outer as u64)?;
            }
            self.free_block(inode.double_indirect as u64)?;
        }

        inode.valid = false;
        self.write_inode(&inode)?;
        self.directory.remove(name);
        self.live_inode_count = self.live_inode_count.saturating_sub(1);
        self.flush_inode_count()?;
        self.flush_bitmap()?;
        Ok(())
    }

    /// Renames `old` to `new`. Fails if `old` is missing or `new` already
    /// names a different live file.
    pub fn rename_file(&mut self, old: &str, new: &str) -> Result<()> {
        validate_name(new)?;
        let mut inode = self
            .directory
            .get(old)
            .cloned()
            .ok_or(EngineError::FileNotFound)?;
        if new != old && self.directory.contains_key(new) {
            return Err(EngineError::DuplicateName);
        }
        inode.name = new.to_string();
        self.write_inode(&inode)?;
        self.directory.remove(old);
        self.directory.insert(new.to_string(), inode);
        Ok(())
    }

    /// Zeroes the superblock, bitmap, and inode regions and reinitializes
    /// them, leaving the directory empty.
    pub fn reset(&mut self) -> Result<()> {
        self.init()
    }
}

/// Reads up to one chunk of `block_size` bytes from `reader`, zero-padding a
/// final short chunk. Returns `None` once `remaining` has reached zero.
fn read_chunk(reader: &mut impl Read, remaining: &mut u64, block_size: usize) -> Result<Option<Vec<u8>>> {
    if *remaining == 0 {
        return Ok(None);
    }
    let take = (*remaining).min(block_size as u64) as usize;
    let mut buf = vec![0u8; block_size];
    reader.read_exact(&mut buf[..take])?;
    *remaining -= take as u64;
    Ok(Some(buf))
}

/// A lazy sequence of a file's data blocks, each exactly `block_size` bytes.
pub struct FileBlocks<'a, D: BlockDevice> {
    fs: &'a mut FileSystem<D>,
    pointers: std::vec::IntoIter<u32>,
}

impl<D: BlockDevice> Iterator for FileBlocks<'_, D> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let pointer = self.pointers.next()?;
        Some(self.fs.read_raw(pointer as u64))
    }
}
