use std::cell::Cell;

use crate::bridge::error::Thrown;

/// Accounts interpreter allocations and can be told to fail the next one.
#[derive(Debug, Default)]
pub struct AllocGuard {
    fail_next: Cell<bool>,
    allocations: Cell<u64>,
}

impl AllocGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self) -> Result<(), Thrown> {
        if self.fail_next.replace(false) {
            return Err(Thrown::out_of_memory());
        }
        self.allocations.set(self.allocations.get() + 1);
        Ok(())
    }

    pub fn fail_next(&self) {
        self.fail_next.set(true);
    }

    pub fn is_armed(&self) -> bool {
        self.fail_next.get()
    }

    pub fn allocations(&self) -> u64 {
        self.allocations.get()
    }
}
