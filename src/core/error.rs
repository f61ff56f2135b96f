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

//! Error type shared by every layer of the filesystem engine.

use std::fmt;
use std::io;

/// An error produced by the block device, the crypt layer, or the filesystem engine.
#[derive(Debug)]
pub enum EngineError {
    /// The configured device could not be found or opened.
    DeviceMissing(io::Error),
    /// A read or write to the underlying device failed.
    Io(io::Error),
    /// A block size or buffer length was not a multiple of the physical sector size.
    Misaligned {
        /// The length or block size that was rejected.
        len: usize,
        /// The physical sector size it should have been a multiple of.
        sector_size: u32,
    },
    /// No filesystem with enough room exists: there is no free data block left.
    NoFreeDataBlock,
    /// No free inode slot is left in the inode table.
    NoFreeInode,
    /// The requested file does not exist.
    FileNotFound,
    /// A file with that name already exists.
    DuplicateName,
    /// The name is empty, longer than 32 bytes, or not valid for an inode.
    InvalidName,
    /// The source is larger than the maximum representable file size.
    TooLarge {
        /// The size that was rejected.
        size: u64,
        /// The maximum size a file may have.
        max: u64,
    },
    /// A crypt operation produced output of a different length than its input.
    CryptLengthChange,
    /// A long-running operation (create, delete, reset) was interrupted partway through.
    Interrupted,
    /// Block 0's magic does not match: the device has not been initialized.
    NotFormatted,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceMissing(e) => write!(f, "device not found: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Misaligned { len, sector_size } => {
                write!(f, "size {len} is not a multiple of the sector size {sector_size}")
            }
            Self::NoFreeDataBlock => write!(f, "no free data block left on device"),
            Self::NoFreeInode => write!(f, "no free inode left in the inode table"),
            Self::FileNotFound => write!(f, "file not found"),
            Self::DuplicateName => write!(f, "a file with that name already exists"),
            Self::InvalidName => write!(f, "invalid file name"),
            Self::TooLarge { size, max } => write!(f, "file of {size} bytes exceeds the maximum of {max} bytes"),
            Self::CryptLengthChange => write!(f, "ciphertext length differs from plaintext length"),
            Self::Interrupted => write!(f, "operation interrupted"),
            Self::NotFormatted => write!(f, "device is not formatted (superblock magic mismatch)"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, EngineError>;
