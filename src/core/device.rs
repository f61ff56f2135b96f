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

//! The block device adapter: presents a raw device or disk image as an array of
//! fixed-size, sector-aligned blocks.
//!
//! The caller picks the block size for each call to [`BlockDevice::read_block`] /
//! [`BlockDevice::write_block`]; it only has to be a positive multiple of the
//! physical sector size reported by [`BlockDevice::geometry`]. Both operations
//! compute the byte offset the same way: `(index + skip) * block_size`, where
//! `skip` is expressed in units of that same block size. Using a different unit
//! on read than on write corrupts the layout, so there is exactly one formula,
//! shared by every caller.

use crate::error::{EngineError, Result};
use std::ffi::c_long;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// ioctl macro: command.
macro_rules! ioc {
    ($a:expr, $b:expr, $c:expr, $d:expr) => {
        (($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
    };
}

/// ioctl macro: read command.
macro_rules! ior {
    ($a:expr, $b:expr, $c:ty) => {
        ioc!(2, $a, $b, std::mem::size_of::<$c>() as c_long)
    };
}

/// ioctl command: get the size of a block device in bytes.
const BLKGETSIZE64: c_long = ior!(0x12, 114, u64);

/// The geometry of a device: its total size, its physical sector size, and the
/// number of physical sectors it holds.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    /// Total size of the device in bytes.
    pub byte_size: u64,
    /// The device's native I/O granularity.
    pub sector_size: u32,
    /// `byte_size / sector_size`.
    pub sector_count: u64,
}

/// A fixed-geometry device addressable in equal-size blocks.
///
/// A leading skip (in units of the block size used on each call) is applied to
/// every offset; see the module documentation for the exact formula.
pub trait BlockDevice {
    /// Returns the device's geometry.
    fn geometry(&self) -> Geometry;

    /// Returns the number of leading blocks (of `block_size`) to skip on every access.
    fn skip(&self) -> u64;

    /// Reads exactly `block_size` bytes starting at logical block `index`.
    ///
    /// `block_size` must be a positive multiple of the physical sector size.
    fn read_block(&mut self, index: u64, block_size: u32) -> Result<Vec<u8>>;

    /// Writes `data` at logical block `index`.
    ///
    /// `data.len()` must be a positive multiple of the physical sector size and is
    /// used as the effective block size for the offset computation.
    fn write_block(&mut self, index: u64, data: &[u8]) -> Result<()>;
}

/// Checks that `len` is a positive multiple of `sector_size`, returning the matching error
/// otherwise.
fn check_aligned(len: usize, sector_size: u32) -> Result<()> {
    if len == 0 || len as u64 % sector_size as u64 != 0 {
        return Err(EngineError::Misaligned { len, sector_size });
    }
    Ok(())
}

/// Computes the byte offset of logical block `index` for a device with the given `skip`
/// (in units of `block_size`).
fn block_offset(index: u64, skip: u64, block_size: u64) -> u64 {
    (index + skip) * block_size
}

/// A [`BlockDevice`] backed by an open file: a real block/character device, or a plain
/// regular file standing in for one (disk images, tests).
///
/// The file handle is opened once and kept for the process lifetime, matching the
/// reference tool's pattern of one long-lived handle for reads and a short-lived
/// handle per write.
pub struct FileDevice {
    file: File,
    geometry: Geometry,
    skip: u64,
}

impl FileDevice {
    /// Opens `path` for reading and writing and probes its geometry.
    ///
    /// If `path` names a block or character device, the physical sector size and
    /// sector count are obtained via `BLKGETSIZE64`. Otherwise (a regular file,
    /// e.g. a disk image) the sector size defaults to 512 bytes and the sector
    /// count is derived from the file's length.
    ///
    /// `skip` is the number of leading blocks (in whatever block size the
    /// caller later passes to `read_block`/`write_block`) to reserve at the
    /// start of the device.
    pub fn open(path: &Path, skip: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(EngineError::DeviceMissing)?;
        let metadata = file.metadata()?;
        let file_type = metadata.file_type();
        let geometry = if file_type.is_block_device() || file_type.is_char_device() {
            let mut byte_size: u64 = 0;
            let ret = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64 as _, &mut byte_size) };
            if ret < 0 {
                return Err(EngineError::Io(std::io::Error::last_os_error()));
            }
            let sector_size = 512;
            Geometry {
                byte_size,
                sector_size,
                sector_count: byte_size / sector_size as u64,
            }
        } else {
            let sector_size = 512;
            let byte_size = metadata.len();
            Geometry {
                byte_size,
                sector_size,
                sector_count: byte_size / sector_size as u64,
            }
        };
        Ok(Self {
            file,
            geometry,
            skip,
        })
    }
}

impl BlockDevice for FileDevice {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn skip(&self) -> u64 {
        self.skip
    }

    fn read_block(&mut self, index: u64, block_size: u32) -> Result<Vec<u8>> {
        check_aligned(block_size as usize, self.geometry.sector_size)?;
        let offset = block_offset(index, self.skip, block_size as u64);
        let mut buf = vec![0u8; block_size as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        match self.file.read_exact(&mut buf) {
            Ok(()) => Ok(buf),
            // A position past the current end of a sparse image reads as all zeros.
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(buf),
            Err(e) => Err(e.into()),
        }
    }

    fn write_block(&mut self, index: u64, data: &[u8]) -> Result<()> {
        check_aligned(data.len(), self.geometry.sector_size)?;
        let offset = block_offset(index, self.skip, data.len() as u64);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write as _;

    fn image(len: u64) -> (tempfile::NamedTempFile, std::path::PathBuf) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&vec![0u8; len as usize]).unwrap();
        let path = f.path().to_path_buf();
        (f, path)
    }

    #[test]
    fn round_trip_block() {
        let (_guard, path) = image(1024 * 1024);
        let mut dev = FileDevice::open(&path, 0).unwrap();
        let data = vec![0xAB; 4096];
        dev.write_block(3, &data).unwrap();
        let back = dev.read_block(3, 4096).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn skip_shifts_offset() {
        let (_guard, path) = image(1024 * 1024);
        let mut dev = FileDevice::open(&path, 2).unwrap();
        let data = vec![0x11; 4096];
        dev.write_block(0, &data).unwrap();
        // Block 0 with skip 2 lands at byte offset 2*4096, not 0.
        let mut raw = File::open(&path).unwrap();
        let mut buf = [0u8; 4096];
        raw.seek(SeekFrom::Start(2 * 4096)).unwrap();
        raw.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[..]);
    }

    #[test]
    fn misaligned_block_size_rejected() {
        let (_guard, path) = image(1024 * 1024);
        let mut dev = FileDevice::open(&path, 0).unwrap();
        let err = dev.write_block(0, &[0u8; 100]).unwrap_err();
        assert!(matches!(err, EngineError::Misaligned { .. }));
    }
}
