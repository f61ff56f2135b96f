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

//! Small helpers shared by the two front-end binaries.

use crate::config::Config;
use crate::crypt::SectorCrypt;
use crate::device::FileDevice;
use crate::layout::DEFAULT_BLOCK_SIZE;
use crate::prompt::prompt_credentials;
use crate::FileSystem;
use std::env::{self, ArgsOs};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::exit;

/// Returns the running binary's name along with an iterator over its arguments.
pub fn args() -> (String, ArgsOs) {
    let mut args = env::args_os();
    let bin = args
        .next()
        .map(PathBuf::from)
        .and_then(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_owned))
        .unwrap_or_else(|| error("sfse", "missing binary name"));
    (bin, args)
}

/// Writes an error to stderr, then exits with status 1.
pub fn error<M: fmt::Display>(bin: &str, msg: M) -> ! {
    eprintln!("{bin}: error: {msg}");
    exit(1);
}

/// Loads the configuration, prompts for the password and PIN, opens the
/// configured device, and mounts (or formats) the volume. Shared by both
/// front ends so the unlock sequence only lives in one place.
pub fn open_volume(bin: &str, config_path: &Path) -> FileSystem<FileDevice> {
    let config = Config::load(config_path).unwrap_or_else(|e| error(bin, e));
    let (password, pin) =
        prompt_credentials().unwrap_or_else(|| error(bin, "no credentials supplied"));
    let device = FileDevice::open(&config.device, 0).unwrap_or_else(|e| error(bin, e));
    let crypt = SectorCrypt::new(&password, &pin);
    FileSystem::open(device, DEFAULT_BLOCK_SIZE, Some(crypt)).unwrap_or_else(|e| error(bin, e))
}
