//! Device memory budget for queue-side allocations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{DeviceError, Result};

/// Tracks bytes handed out by `Queue::allocate`. Unlimited when `limit`
/// is `None`.
#[derive(Debug)]
pub(crate) struct MemoryBudget {
    limit: Option<usize>,
    used: AtomicUsize,
}

impl MemoryBudget {
    pub fn new(limit: Option<usize>) -> Arc<Self> {
        Arc::new(MemoryBudget {
            limit,
            used: AtomicUsize::new(0),
        })
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    pub fn reserve(self: &Arc<Self>, bytes: usize) -> Result<Allocation> {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(bytes);
            if let Some(limit) = self.limit {
                if next > limit {
                    return Err(DeviceError::OutOfMemory {
                        requested: bytes,
                        available: limit.saturating_sub(current),
                    });
                }
            }
            match self.used.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Ok(Allocation {
                        budget: self.clone(),
                        bytes,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// Reservation returned to the budget on drop.
#[derive(Debug)]
pub(crate) struct Allocation {
    budget: Arc<MemoryBudget>,
    bytes: usize,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        self.budget.used.fetch_sub(self.bytes, Ordering::AcqRel);
    }
}
