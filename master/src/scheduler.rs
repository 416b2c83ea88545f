//! Port Allocator (C4): per-worker smallest-free-port selection.
//!
//! Grounded algorithmically on
//! `examples/original_source/master/user.go`'s `findOrInitAllocation` port
//! scan loop, reimplemented with a `HashSet` instead of a `[65536]bool`
//! array (no fixed "port space" assumption baked into the data structure).
//! The surrounding shape — a pure function over a snapshot, returning a
//! typed error enum instead of a sentinel `0` port — follows the pattern
//! `examples/pks-os-neon/storage_controller/src/scheduler.rs` uses for
//! `ScheduleError`, even though that file's actual scoring algorithm does
//! not apply here (this allocator has no competing placement factors to
//! balance — see DESIGN.md).

use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("no free port available in range [{min}, {max}]")]
    PoolFull { min: u16, max: u16 },
}

/// Returns the smallest port in `[min, max]` not present in `allocated`.
pub fn pick_free_port(
    allocated: &HashSet<u16>,
    min: u16,
    max: u16,
) -> Result<u16, ScheduleError> {
    for candidate in min..=max {
        if !allocated.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(ScheduleError::PoolFull { min, max })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_smallest_free_port() {
        let allocated = HashSet::from([20000, 20002]);
        assert_eq!(pick_free_port(&allocated, 20000, 20005), Ok(20001));
    }

    #[test]
    fn picks_range_start_when_empty() {
        let allocated = HashSet::new();
        assert_eq!(pick_free_port(&allocated, 20000, 20000), Ok(20000));
    }

    #[test]
    fn reports_pool_full() {
        let allocated = HashSet::from([20000]);
        assert_eq!(
            pick_free_port(&allocated, 20000, 20000),
            Err(ScheduleError::PoolFull {
                min: 20000,
                max: 20000
            })
        );
    }

    #[test]
    fn is_deterministic_across_repeated_calls() {
        let allocated = HashSet::from([20000, 20001]);
        let first = pick_free_port(&allocated, 20000, 20010);
        let second = pick_free_port(&allocated, 20000, 20010);
        assert_eq!(first, second);
    }
}
