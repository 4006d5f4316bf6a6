// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{fs, thread};

use log::warn;

const MIB: u64 = 1024 * 1024;
const FALLBACK_WINDOW_SIZE: usize = 64 * MIB as usize;
const MEMINFO_PATH: &str = "/proc/meminfo";

/// Default per-worker window: total memory split across the available cores, less a
/// 1 MiB margin when the share exceeds 1 MiB. Falls back to 64 MiB when memory cannot
/// be determined.
pub fn default_window_size() -> usize {
    let cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match total_memory_bytes() {
        Some(total) => window_size_for(total, cores),
        None => {
            warn!("could not read total memory from {MEMINFO_PATH}; using {FALLBACK_WINDOW_SIZE} byte windows");
            FALLBACK_WINDOW_SIZE
        }
    }
}

pub fn window_size_for(total_memory: u64, cores: usize) -> usize {
    let share = total_memory / cores.max(1) as u64;
    let share = if share > MIB { share - MIB } else { share };
    usize::try_from(share).unwrap_or(usize::MAX).max(1)
}

pub fn total_memory_bytes() -> Option<u64> {
    let meminfo = fs::read_to_string(MEMINFO_PATH).ok()?;
    parse_mem_total(&meminfo)
}

fn parse_mem_total(meminfo: &str) -> Option<u64> {
    let line = meminfo.lines().find(|line| line.starts_with("MemTotal:"))?;
    let mut fields = line["MemTotal:".len()..].split_whitespace();
    let value: u64 = fields.next()?.parse().ok()?;
    let scale = match fields.next() {
        Some("kB") | Some("KB") => 1024,
        Some("mB") | Some("MB") => MIB,
        None => 1,
        Some(_) => return None,
    };
    value.checked_mul(scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mem_total_in_kib() {
        let meminfo = "MemTotal:       16318480 kB\nMemFree:         1034560 kB\n";
        assert_eq!(parse_mem_total(meminfo), Some(16318480 * 1024));
        assert_eq!(parse_mem_total("MemFree: 10 kB\n"), None);
    }

    #[test]
    fn window_share_keeps_a_margin() {
        assert_eq!(window_size_for(8 * 1024 * MIB, 8), (1024 - 1) * MIB as usize);
        assert_eq!(window_size_for(MIB / 2, 1), (MIB / 2) as usize);
        assert_eq!(window_size_for(MIB, 1), MIB as usize);
        assert_eq!(window_size_for(0, 4), 1);
    }

    #[test]
    fn default_is_positive() {
        assert!(default_window_size() > 0);
    }
}
