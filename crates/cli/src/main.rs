//! # CLI - LSM storage engine interactive shell
//!
//! A REPL-style command-line interface for the embedded LSM storage engine.
//! Reads commands from stdin, executes them against the engine, and prints
//! results to stdout. Designed for both interactive use and scripted testing
//! (pipe commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value      Insert or update a key-value pair
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key (writes a tombstone)
//! SCAN [start] [end] Range scan (inclusive start, inclusive end)
//! PREFIX prefix      List all keys starting with prefix
//! FLUSH              Force-roll and flush the memtable to an SSTable
//! COMPACT            Run compaction passes until none are pending
//! STATS              Print engine debug counters
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! LSMKV_DATA_DIR           Data directory                   (default: "./data")
//! LSMKV_MEMTABLE_MAX_BYTES Memtable flush threshold in bytes (default: 16MiB)
//! LSMKV_L0_MAX_SSTS        L0 compaction trigger             (default: 4)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! LSM store opened (seq=0, data_dir=./data, memtable_max_bytes=16777216, l0_max_ssts=4)
//! > SET name Alice
//! OK
//! > GET name
//! Alice
//! > SCAN
//! name -> Alice
//! (1 entries)
//! > EXIT
//! bye
//! ```
use std::io::{self, BufRead, Write};

use anyhow::Result;
use config::Config;
use engine::Engine;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn config_from_env() -> Config {
    let mut cfg = Config::default();
    cfg.memtable.max_bytes = env_or("LSMKV_MEMTABLE_MAX_BYTES", cfg.memtable.max_bytes);
    cfg.lsm.l0_max_ssts = env_or("LSMKV_L0_MAX_SSTS", cfg.lsm.l0_max_ssts);
    cfg
}

fn main() -> Result<()> {
    let cfg = config_from_env();
    let engine = Engine::open(cfg.clone())?;

    println!(
        "LSM store opened (seq={}, data_dir={}, memtable_max_bytes={}, l0_max_ssts={})",
        engine.seq(),
        cfg.resolved_data_dir().display(),
        cfg.memtable.max_bytes,
        cfg.lsm.l0_max_ssts,
    );
    println!("Commands: SET key value | GET key | DEL key | SCAN [start] [end] | PREFIX prefix");
    println!("          COMPACT | FLUSH | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            match engine.put(k.as_bytes().to_vec(), v.as_bytes().to_vec()) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match engine.get(k.as_bytes()) {
                            Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match engine.delete(k.as_bytes().to_vec()) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "SCAN" => {
                    let start = parts.next().unwrap_or("").as_bytes();
                    let end_arg = parts.next();
                    let end: Vec<u8> = match end_arg {
                        Some(e) => e.as_bytes().to_vec(),
                        None => vec![0xff; 256],
                    };
                    match engine.range(start, &end) {
                        Ok(results) => print_entries(&results),
                        Err(e) => println!("ERR scan failed: {}", e),
                    }
                }
                "PREFIX" => {
                    if let Some(p) = parts.next() {
                        match engine.prefix(p.as_bytes()) {
                            Ok(results) => print_entries(&results),
                            Err(e) => println!("ERR prefix failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: PREFIX prefix");
                    }
                }
                "COMPACT" => match engine.compact() {
                    Ok(()) => println!(
                        "OK (L0={}, L1={}, total={})",
                        engine.level_sst_count(0),
                        engine.level_sst_count(1),
                        engine.sst_count()
                    ),
                    Err(e) => println!("ERR compact failed: {}", e),
                },
                "FLUSH" => match engine.flush() {
                    Ok(()) => println!(
                        "OK (L0={}, L1={}, total={})",
                        engine.level_sst_count(0),
                        engine.level_sst_count(1),
                        engine.sst_count()
                    ),
                    Err(e) => println!("ERR flush failed: {}", e),
                },
                "STATS" => {
                    println!("{:?}", engine.stats());
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    engine.close()?;
    Ok(())
}

fn print_entries(results: &[(Vec<u8>, Vec<u8>)]) {
    if results.is_empty() {
        println!("(empty)");
    } else {
        for (k, v) in results {
            println!("{} -> {}", String::from_utf8_lossy(k), String::from_utf8_lossy(v));
        }
        println!("({} entries)", results.len());
    }
}
