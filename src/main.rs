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

//! Interactive REPL front end: unlocks a volume once, then accepts verbs on
//! stdin until `exit`.

use sfse::cli::{args, open_volume};
use sfse::device::FileDevice;
use sfse::layout::DEFAULT_BLOCK_SIZE;
use sfse::prompt::prompt;
use sfse::util::ByteSize;
use sfse::FileSystem;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::exit;

/// Default location of the configuration file when `-c` is not given.
const DEFAULT_CONFIG: &str = "/etc/sfse.conf";

fn print_usage() {
    eprintln!("Usage: sfse [-c CONFIG]");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h:\t\tprints usage");
    eprintln!(" -c CONFIG:\tconfiguration file (default: {DEFAULT_CONFIG})");
}

fn main() {
    sfse::signal::install();
    let (bin, mut argv) = args();
    let mut config_path = PathBuf::from(DEFAULT_CONFIG);
    while let Some(arg) = argv.next() {
        match arg.to_str() {
            Some("-h") => {
                print_usage();
                exit(0);
            }
            Some("-c") => {
                let Some(path) = argv.next() else {
                    print_usage();
                    exit(1);
                };
                config_path = PathBuf::from(path);
            }
            _ => {
                print_usage();
                exit(1);
            }
        }
    }

    let mut fs = open_volume(&bin, &config_path);

    println!("sfse: volume ready. Type `help` for the verb list.");
    loop {
        let Some(line) = prompt("sfse> ", false) else {
            println!();
            break;
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["help"] => print_help(),
            ["list"] => {
                let mut names: Vec<&str> = fs.list().collect();
                names.sort_unstable();
                for name in names {
                    println!("{name}");
                }
            }
            ["usage"] => {
                let usage = fs.usage();
                println!("capacity:   {}", ByteSize(usage.total_bytes));
                println!("files:      {}/{}", usage.live_files, usage.max_files);
                println!("max size:   {}", ByteSize(usage.max_file_size));
            }
            ["read", name] => {
                if let Err(e) = read_to(&mut fs, name, &mut io::stdout()) {
                    println!("error: {e}");
                }
            }
            ["dump", name, dest] => match std::fs::File::create(dest) {
                Ok(mut out) => {
                    if let Err(e) = read_to(&mut fs, name, &mut out) {
                        println!("error: {e}");
                    }
                }
                Err(e) => println!("error: {e}"),
            },
            ["create", name, source] => {
                if let Err(e) = fs.create_file(name, source.as_ref()) {
                    println!("error: {e}");
                }
            }
            ["delete", name] => {
                if let Err(e) = fs.delete_file(name) {
                    println!("error: {e}");
                }
            }
            ["rename", old, new] => {
                if let Err(e) = fs.rename_file(old, new) {
                    println!("error: {e}");
                }
            }
            ["reset"] => {
                if let Err(e) = fs.reset() {
                    println!("error: {e}");
                }
            }
            ["benchmark"] => run_benchmark(),
            ["exit"] | ["quit"] => break,
            _ => println!("unrecognized command; type `help`"),
        }
    }
}

fn print_help() {
    println!("list                      list file names");
    println!("usage                     show capacity and inode usage");
    println!("read <name>               print a file's contents to stdout");
    println!("dump <name> <path>        write a file's contents to a host path");
    println!("create <name> <path>      create a file from a host path");
    println!("delete <name>             delete a file");
    println!("rename <old> <new>        rename a file");
    println!("reset                     wipe the volume");
    println!("benchmark                 time a plain-mode round trip on a scratch image");
    println!("exit                      leave sfse");
}

fn read_to<D: sfse::device::BlockDevice, W: Write>(
    fs: &mut FileSystem<D>,
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

/// Times a create+read round trip against a scratch disk image in plain
/// (crypt-bypassed) mode. Diagnostic only; never the mode a real volume runs in.
fn run_benchmark() {
    let tmp = match tempfile::NamedTempFile::new() {
        Ok(t) => t,
        Err(e) => {
            println!("error: {e}");
            return;
        }
    };
    if tmp.as_file().set_len(64 * 1024 * 1024).is_err() {
        println!("error: could not size scratch image");
        return;
    }
    let device = match FileDevice::open(tmp.path(), 0) {
        Ok(d) => d,
        Err(e) => {
            println!("error: {e}");
            return;
        }
    };
    let mut scratch = match FileSystem::open(device, DEFAULT_BLOCK_SIZE, None) {
        Ok(fs) => fs,
        Err(e) => {
            println!("error: {e}");
            return;
        }
    };
    let payload = vec![0xAAu8; 1024 * 1024];
    let start = std::time::Instant::now();
    if let Err(e) = scratch.create_file_from_reader("bench", payload.len() as u64, &payload[..]) {
        println!("error: {e}");
        return;
    }
    let mut sink = Vec::new();
    if let Err(e) = read_to(&mut scratch, "bench", &mut sink) {
        println!("error: {e}");
        return;
    }
    println!(
        "wrote + read {} in {:?} (plain mode, scratch image)",
        ByteSize(payload.len() as u64),
        start.elapsed()
    );
    debug_assert_eq!(sink, payload);
}
