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

//! Scriptable, non-interactive front end: takes one verb and its arguments on
//! the command line, performs it, and exits. This stands in for the original
//! graphical explorer, which this toolset has no display/windowing crate to
//! build against; it consumes the same verb set as the interactive REPL, in
//! batch form instead of GUI form.

use sfse::cli::{args, error, open_volume};
use sfse::util::ByteSize;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

const DEFAULT_CONFIG: &str = "/etc/sfse.conf";

fn print_usage() {
    eprintln!("Usage: sfse-explorer [-c CONFIG] <verb> [args...]");
    eprintln!();
    eprintln!("Verbs:");
    eprintln!(" list");
    eprintln!(" usage");
    eprintln!(" read <name>");
    eprintln!(" dump <name> <host-path>");
    eprintln!(" create <name> <host-path>");
    eprintln!(" delete <name>");
    eprintln!(" rename <old> <new>");
    eprintln!(" reset");
}

fn main() {
    sfse::signal::install();
    let (bin, argv) = args();
    let mut config_path = PathBuf::from(DEFAULT_CONFIG);
    let mut rest: Vec<String> = Vec::new();
    let mut iter = argv.peekable();
    while let Some(arg) = iter.next() {
        match arg.to_str() {
            Some("-c") => {
                let Some(path) = iter.next() else {
                    print_usage();
                    exit(1);
                };
                config_path = PathBuf::from(path);
            }
            Some(other) => rest.push(other.to_string()),
            None => {
                print_usage();
                exit(1);
            }
        }
    }

    let Some((verb, verb_args)) = rest.split_first() else {
        print_usage();
        exit(1);
    };

    let mut fs = open_volume(&bin, &config_path);

    let result: sfse::Result<()> = match (verb.as_str(), verb_args) {
        ("list", []) => {
            let mut names: Vec<&str> = fs.list().collect();
            names.sort_unstable();
            for name in names {
                println!("{name}");
            }
            Ok(())
        }
        ("usage", []) => {
            let usage = fs.usage();
            println!("capacity:   {}", ByteSize(usage.total_bytes));
            println!("files:      {}/{}", usage.live_files, usage.max_files);
            println!("max size:   {}", ByteSize(usage.max_file_size));
            Ok(())
        }
        ("read", [name]) => read_to(&mut fs, name, &mut std::io::stdout()),
        ("dump", [name, dest]) => match std::fs::File::create(dest) {
            Ok(mut out) => read_to(&mut fs, name, &mut out),
            Err(e) => Err(e.into()),
        },
        ("create", [name, source]) => fs.create_file(name, source.as_ref()),
        ("delete", [name]) => fs.delete_file(name),
        ("rename", [old, new]) => fs.rename_file(old, new),
        ("reset", []) => fs.reset(),
        _ => {
            print_usage();
            exit(1);
        }
    };

    if let Err(e) = result {
        error(&bin, e);
    }
}

fn read_to<D: sfse::device::BlockDevice, W: Write>(
    fs: &mut sfse::FileSystem<D>,
    name: &str,
    out: &mut W,
) -> sfse::Result<()> {
    let size = fs.file_size(name)?;
    let mut written = 0u64;
    for block in fs.read_file(name)? {
        let block = block?;
        let take = (size - written).min(block.len() as u64) as usize;
        out.write_all(&block[..take]).ok();
        written += take as u64;
    }
    Ok(())
}
