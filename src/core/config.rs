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

//! The single-line `serial=<device>` configuration file.
//!
//! A full udev-style serial-to-path resolver is out of scope (see the
//! crate's top-level documentation); on Linux the "serial" is accepted as a
//! direct path to a block/character device, or to a regular file standing in
//! for one.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// An error parsing a configuration file.
#[derive(Debug)]
pub struct InvalidConfig;

impl fmt::Display for InvalidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected a single `serial=<device path>` line")
    }
}

impl std::error::Error for InvalidConfig {}

/// A parsed configuration: the resolved device path.
pub struct Config {
    /// Path to the device, or disk image, to open.
    pub device: PathBuf,
}

impl Config {
    /// Reads and parses the configuration file at `path`.
    pub fn load(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Parses the single-line `serial=<device path>` format.
    pub fn parse(content: &str) -> Result<Self, InvalidConfig> {
        let line = content.lines().find(|l| !l.trim().is_empty()).ok_or(InvalidConfig)?;
        let (key, value) = line.split_once('=').ok_or(InvalidConfig)?;
        if key.trim() != "serial" {
            return Err(InvalidConfig);
        }
        let value = value.trim();
        if value.is_empty() {
            return Err(InvalidConfig);
        }
        Ok(Self {
            device: PathBuf::from(value),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_serial_line() {
        let config = Config::parse("serial=/dev/sdb\n").unwrap();
        assert_eq!(config.device, PathBuf::from("/dev/sdb"));
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let config = Config::parse("  serial = /tmp/volume.img  \n").unwrap();
        assert_eq!(config.device, PathBuf::from("/tmp/volume.img"));
    }

    #[test]
    fn rejects_wrong_key() {
        assert!(Config::parse("device=/dev/sdb").is_err());
    }

    #[test]
    fn rejects_empty_value() {
        assert!(Config::parse("serial=").is_err());
    }

    #[test]
    fn rejects_empty_file() {
        assert!(Config::parse("").is_err());
    }
}
