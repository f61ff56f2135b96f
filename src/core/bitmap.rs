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

//! The allocation bitmap cache: tracks which data blocks are free, lazily
//! loading bitmap blocks from disk and batching writes until an explicit
//! [`BitmapCache::flush`].
//!
//! This is deliberately not written through on every bit flip. A crash
//! between a flip and a flush leaves the in-memory state ahead of disk: data
//! blocks that were written appear free again at the next mount. That is the
//! allocator's only durability guarantee — per-operation atomicity, not
//! crash consistency of individual bits.

use crate::error::{EngineError, Result};
use std::collections::HashMap;

/// Plaintext block I/O as seen by the bitmap cache: reading and writing one
/// already-decrypted/to-be-encrypted block by absolute device index. The
/// engine supplies the implementation so the cache does not need to know
/// about the device adapter or the crypt layer.
pub trait BlockIo {
    /// Reads the block at absolute device index `index`.
    fn read_block(&mut self, index: u64) -> Result<Vec<u8>>;
    /// Writes `data` to the block at absolute device index `index`.
    fn write_block(&mut self, index: u64, data: &[u8]) -> Result<()>;
}

/// Lazily-loaded, write-batched bitmap state.
pub struct BitmapCache {
    bits_per_block: u64,
    data_offset: u64,
    /// Sparse map from data-block index to its allocation bit, populated only
    /// for blocks whose containing bitmap block has been loaded.
    bitmap: HashMap<u64, bool>,
    /// Bitmap blocks (keyed by absolute device index) touched since the last
    /// flush, holding their full current contents.
    hot: HashMap<u64, Vec<u8>>,
}

impl BitmapCache {
    /// Creates an empty cache for a filesystem with the given block size and data offset.
    pub fn new(block_size: u32, data_offset: u64) -> Self {
        Self {
            bits_per_block: block_size as u64 * 8,
            data_offset,
            bitmap: HashMap::new(),
            hot: HashMap::new(),
        }
    }

    /// Maps a data-block index to (absolute bitmap block index, byte offset, bit offset).
    fn locate(&self, data_block: u64) -> (u64, usize, u8) {
        let relative = data_block - self.data_offset;
        let block_pos = relative / self.bits_per_block;
        let within = relative % self.bits_per_block;
        let byte_k = (within / 8) as usize;
        let bit_j = (within % 8) as u8;
        // Bitmap region starts at absolute device block 1; `block_pos` is the
        // 0-indexed position of this bitmap block within that region.
        (1 + block_pos, byte_k, bit_j)
    }

    /// Loads bitmap block `absolute_block` into `hot` if it is not already
    /// cached, populating `bitmap` entries for every set bit it holds.
    fn load(&mut self, io: &mut dyn BlockIo, absolute_block: u64) -> Result<()> {
        if self.hot.contains_key(&absolute_block) {
            return Ok(());
        }
        let block = io.read_block(absolute_block)?;
        let block_pos = absolute_block - 1;
        for (byte_k, byte) in block.iter().enumerate() {
            for bit_j in 0..8u8 {
                if byte & (1 << bit_j) != 0 {
                    let data_block = self.data_offset
                        + block_pos * self.bits_per_block
                        + byte_k as u64 * 8
                        + bit_j as u64;
                    self.bitmap.insert(data_block, true);
                }
            }
        }
        self.hot.insert(absolute_block, block);
        Ok(())
    }

    /// Returns whether `data_block` is currently marked allocated, loading its
    /// bitmap block on demand.
    pub fn is_allocated(&mut self, io: &mut dyn BlockIo, data_block: u64) -> Result<bool> {
        let (m, _, _) = self.locate(data_block);
        self.load(io, m)?;
        Ok(*self.bitmap.get(&data_block).unwrap_or(&false))
    }

    /// Sets the allocation bit for `data_block` in memory. Not written to disk
    /// until [`flush`](Self::flush).
    pub fn flip_bit(&mut self, io: &mut dyn BlockIo, data_block: u64, allocated: bool) -> Result<()> {
        let (m, byte_k, bit_j) = self.locate(data_block);
        self.load(io, m)?;
        let block = self
            .hot
            .get_mut(&m)
            .expect("load() just populated this entry");
        if allocated {
            block[byte_k] |= 1 << bit_j;
        } else {
            block[byte_k] &= !(1 << bit_j);
        }
        self.bitmap.insert(data_block, allocated);
        Ok(())
    }

    /// Scans for the first free data block in `[data_offset, total_blocks)`,
    /// marks it allocated, and returns its index.
    pub fn allocate(&mut self, io: &mut dyn BlockIo, total_blocks: u64) -> Result<u64> {
        for candidate in self.data_offset..total_blocks {
            if !self.is_allocated(io, candidate)? {
                self.flip_bit(io, candidate, true)?;
                return Ok(candidate);
            }
        }
        Err(EngineError::NoFreeDataBlock)
    }

    /// Writes every hot bitmap block back to disk and clears the hot set.
    pub fn flush(&mut self, io: &mut dyn BlockIo) -> Result<()> {
        for (&m, block) in self.hot.iter() {
            io.write_block(m, block)?;
        }
        self.hot.clear();
        Ok(())
    }

    /// Discards all cached state without writing anything, used by `reset_disk`
    /// once every block has already been zeroed directly.
    pub fn clear(&mut self) {
        self.bitmap.clear();
        self.hot.clear();
    }
}
