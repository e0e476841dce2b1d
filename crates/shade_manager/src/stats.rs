//! Running compilation statistics.

use std::time::Duration;

use serde::Serialize;

/// Snapshot of the manager's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Backend invocations that succeeded.
    pub total_compilations: u64,
    /// Requests served from either cache tier.
    pub cache_hits: u64,
    /// Requests that had to compile.
    pub cache_misses: u64,
    /// Backend invocations that failed.
    pub compilation_errors: u64,
    /// Compiles scheduled on the thread pool.
    pub async_compilations: u64,
    /// Hot-reload callbacks fired.
    pub hot_reloads: u64,
    /// Time spent in successful backend invocations.
    pub total_compile_time: Duration,
    /// Memory tier entries at snapshot time.
    pub cache_entries: usize,
    /// Memory tier bytes at snapshot time.
    pub cache_memory_bytes: u64,
}

impl Statistics {
    /// Mean duration of a successful compile.
    pub fn average_compile_time(&self) -> Duration {
        match u32::try_from(self.total_compilations) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total_compile_time / n,
            Err(_) => Duration::from_secs_f64(
                self.total_compile_time.as_secs_f64() / self.total_compilations as f64,
            ),
        }
    }

    /// Fraction of lookups served from cache, `0.0` before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats() {
        let s = Statistics::default();
        assert_eq!(s.average_compile_time(), Duration::ZERO);
        assert_eq!(s.hit_ratio(), 0.0);
    }

    #[test]
    fn averages_and_ratio() {
        let s = Statistics {
            total_compilations: 4,
            total_compile_time: Duration::from_millis(40),
            cache_hits: 3,
            cache_misses: 1,
            ..Statistics::default()
        };
        assert_eq!(s.average_compile_time(), Duration::from_millis(10));
        assert_eq!(s.hit_ratio(), 0.75);
    }
}
