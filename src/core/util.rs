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

//! Miscellaneous utility functions shared across the crate.

use std::fmt;

/// Returns `ceil(a / b)`.
pub fn ceil_division(a: u64, b: u64) -> u64 {
    a.div_ceil(b)
}

/// Performs the log2 operation on the given integer.
///
/// Returns `None` if `n` is zero.
pub fn log2(n: u64) -> Option<u32> {
    if n == 0 {
        None
    } else {
        Some(u64::BITS - 1 - n.leading_zeros())
    }
}

/// A human-readable number of bytes, formatted as `N unit` (e.g. `"4 KiB"`).
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 7] = ["bytes", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
        let mut order = log2(self.0).unwrap_or(0) / log2(1024).unwrap();
        if order as usize >= UNITS.len() {
            order = 0;
        }
        let unit = 1024u64.pow(order);
        write!(fmt, "{} {}", self.0 / unit.max(1), UNITS[order as usize])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bytesize() {
        assert_eq!(format!("{}", ByteSize(0)), "0 bytes");
        assert_eq!(format!("{}", ByteSize(1)), "1 bytes");
        assert_eq!(format!("{}", ByteSize(1023)), "1023 bytes");
        assert_eq!(format!("{}", ByteSize(1024)), "1 KiB");
        assert_eq!(format!("{}", ByteSize(1024 * 1024)), "1 MiB");
        assert_eq!(format!("{}", ByteSize(1024 * 1024 * 1024)), "1 GiB");
    }

    #[test]
    fn log2_values() {
        assert_eq!(log2(1), Some(0));
        assert_eq!(log2(2), Some(1));
        assert_eq!(log2(4096), Some(12));
        assert_eq!(log2(0), None);
    }

    #[test]
    fn ceil_division_values() {
        assert_eq!(ceil_division(0, 4), 0);
        assert_eq!(ceil_division(1, 4), 1);
        assert_eq!(ceil_division(4, 4), 1);
        assert_eq!(ceil_division(5, 4), 2);
    }
}
