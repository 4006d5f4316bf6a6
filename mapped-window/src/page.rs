// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::OnceLock;

const FALLBACK_PAGE_SIZE: u64 = 4096;

static PAGE_SIZE: OnceLock<u64> = OnceLock::new();

/// System page size in bytes; window starts are always a multiple of this.
pub fn page_size() -> u64 {
    *PAGE_SIZE.get_or_init(|| {
        // SAFETY: sysconf only reads a process-wide constant.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 {
            size as u64
        } else {
            log::warn!("sysconf(_SC_PAGESIZE) failed; assuming {FALLBACK_PAGE_SIZE} byte pages");
            FALLBACK_PAGE_SIZE
        }
    })
}

/// Placement of one mapping: the aligned file offset it starts at, how far into it the
/// requested offset sits, and how many bytes to map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WindowPlan {
    pub start: u64,
    pub delta: usize,
    pub map_len: usize,
}

impl WindowPlan {
    /// Covers `[offset, offset + len)` capped at `file_len`, starting on a page boundary.
    pub fn new(offset: u64, len: usize, file_len: u64, page: u64) -> Self {
        let start = offset - offset % page;
        let delta = (offset - start) as usize;
        let available = file_len.saturating_sub(offset);
        let effective = available.min(len as u64) as usize;
        Self {
            start,
            delta,
            map_len: delta + effective,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_aligns_start_and_caps_length() {
        let plan = WindowPlan::new(5000, 1000, 100_000, 4096);
        assert_eq!(plan.start, 4096);
        assert_eq!(plan.delta, 904);
        assert_eq!(plan.map_len, 1904);

        let capped = WindowPlan::new(5000, 1_000_000, 5500, 4096);
        assert_eq!(capped.map_len, 904 + 500);

        let aligned = WindowPlan::new(8192, 10, 100_000, 4096);
        assert_eq!(aligned.start, 8192);
        assert_eq!(aligned.delta, 0);
        assert_eq!(aligned.map_len, 10);
    }

    #[test]
    fn page_size_is_power_of_two() {
        let page = page_size();
        assert!(page >= 512);
        assert!(page.is_power_of_two());
    }
}
