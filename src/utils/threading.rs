//! # Work-Distribution Harness
//!
//! Splits a batch of items across worker threads: a static contiguous
//! partition drained through per-range atomic cursors, with optional
//! single-item work stealing once a worker runs dry. Stealing bounds tail
//! latency when per-item cost is skewed (reads of very different lengths);
//! the cursor `fetch_add` guarantees each index is claimed exactly once no
//! matter who processes it.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A thief leaves ranges with fewer remaining items than this to their
/// owner.
const MIN_STEAL_GAP: usize = 2;

/// Harness configuration.
#[derive(Debug, Clone, Copy)]
pub struct ParallelOptions {
    pub nthreads: usize,
    pub work_stealing: bool,
}

impl ParallelOptions {
    pub fn new(nthreads: usize) -> Self {
        Self {
            nthreads: nthreads.max(1),
            work_stealing: true,
        }
    }

    pub fn without_stealing(mut self) -> Self {
        self.work_stealing = false;
        self
    }
}

/// One thread's slice of the batch. `cursor` may legally run past `end`
/// when several claimants race on the final item; a claim counts only if
/// the fetched index is still inside the range.
struct Range {
    cursor: AtomicUsize,
    end: usize,
}

impl Range {
    #[inline]
    fn claim(&self) -> Option<usize> {
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
        (idx < self.end).then_some(idx)
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.end.saturating_sub(self.cursor.load(Ordering::SeqCst))
    }
}

/// Apply `f` to every index in `0..n_items`, distributing across
/// `options.nthreads` workers.
///
/// With one thread the loop runs serially with no synchronisation. With
/// more, each worker drains its own contiguous range
/// (`step = ceil(N / threads)`), then, if stealing is enabled, claims
/// single items from whichever range has the most left, until no range has
/// work above the minimum-gap threshold. Leftovers below the threshold are
/// always finished by their owner, so every index is processed exactly
/// once for any thread count.
pub fn parallel_for<F>(n_items: usize, options: ParallelOptions, f: F)
where
    F: Fn(usize) + Sync,
{
    if n_items == 0 {
        return;
    }
    let nthreads = options.nthreads.max(1);
    if nthreads == 1 {
        for i in 0..n_items {
            f(i);
        }
        return;
    }

    let step = n_items.div_ceil(nthreads);
    let ranges: Vec<Range> = (0..nthreads)
        .map(|t| Range {
            cursor: AtomicUsize::new((t * step).min(n_items)),
            end: ((t + 1) * step).min(n_items),
        })
        .collect();

    std::thread::scope(|scope| {
        for own in 0..nthreads {
            let ranges = &ranges;
            let f = &f;
            scope.spawn(move || {
                while let Some(idx) = ranges[own].claim() {
                    f(idx);
                }
                if !options.work_stealing {
                    return;
                }
                loop {
                    let victim = ranges
                        .iter()
                        .enumerate()
                        .max_by_key(|(_, r)| r.remaining())
                        .map(|(i, _)| i)
                        .expect("at least one range");
                    if ranges[victim].remaining() < MIN_STEAL_GAP {
                        break;
                    }
                    if let Some(idx) = ranges[victim].claim() {
                        f(idx);
                    }
                }
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn run_and_count(n_items: usize, options: ParallelOptions) -> Vec<u32> {
        let counts: Vec<AtomicU32> = (0..n_items).map(|_| AtomicU32::new(0)).collect();
        parallel_for(n_items, options, |i| {
            counts[i].fetch_add(1, Ordering::SeqCst);
        });
        counts.iter().map(|c| c.load(Ordering::SeqCst)).collect()
    }

    #[test]
    fn test_every_item_exactly_once_serial() {
        let counts = run_and_count(100, ParallelOptions::new(1));
        assert!(counts.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_every_item_exactly_once_parallel() {
        for nthreads in [2, 3, 7, 16] {
            let counts = run_and_count(1000, ParallelOptions::new(nthreads));
            assert!(
                counts.iter().all(|&c| c == 1),
                "nthreads={} left items unprocessed or duplicated",
                nthreads
            );
        }
    }

    #[test]
    fn test_more_threads_than_items() {
        let counts = run_and_count(3, ParallelOptions::new(8));
        assert!(counts.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_stealing_disabled_still_exactly_once() {
        for nthreads in [2, 5] {
            let counts = run_and_count(257, ParallelOptions::new(nthreads).without_stealing());
            assert!(counts.iter().all(|&c| c == 1));
        }
    }

    #[test]
    fn test_empty_batch() {
        let counts = run_and_count(0, ParallelOptions::new(4));
        assert!(counts.is_empty());
    }

    #[test]
    fn test_skewed_items_complete_with_stealing() {
        // one pathologically slow item at the front of thread 0's range
        let counts: Vec<AtomicU32> = (0..64).map(|_| AtomicU32::new(0)).collect();
        parallel_for(64, ParallelOptions::new(4), |i| {
            if i == 0 {
                std::thread::sleep(std::time::Duration::from_millis(20));
            }
            counts[i].fetch_add(1, Ordering::SeqCst);
        });
        assert!(counts.iter().all(|c| c.load(Ordering::SeqCst) == 1));
    }
}
