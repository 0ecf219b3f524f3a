//! Kernel registry: one entry per kernel identity launched on a queue.
//!
//! Keyed by kernel name, since the same name always denotes the same
//! specialized kernel body. Lives for the lifetime of the queue.

use fxhash::FxHashMap;

use crate::range::WorkSize;

/// Launch statistics for one kernel identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelStats {
    pub launches: usize,
    pub last_work_size: WorkSize,
}

#[derive(Debug, Default)]
pub(crate) struct KernelRegistry {
    entries: FxHashMap<String, KernelStats>,
}

impl KernelRegistry {
    pub fn record(&mut self, kernel: &str, work_size: WorkSize) {
        match self.entries.get_mut(kernel) {
            Some(stats) => {
                stats.launches += 1;
                stats.last_work_size = work_size;
            }
            None => {
                self.entries.insert(
                    kernel.to_string(),
                    KernelStats {
                        launches: 1,
                        last_work_size: work_size,
                    },
                );
            }
        }
    }

    pub fn get(&self, kernel: &str) -> Option<KernelStats> {
        self.entries.get(kernel).copied()
    }

    pub fn total_launches(&self) -> usize {
        self.entries.values().map(|s| s.launches).sum()
    }
}
