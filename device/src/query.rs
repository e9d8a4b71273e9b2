//! Query pools.
//!
//! A query pool is a fixed array of duration slots. The execution loop adds
//! each command's wall-clock cost to the active slot between a begin and an
//! end command; readers observe the accumulated total.

use std::time::Duration;

use parking_lot::Mutex;
use snafu::ensure;

use crate::error::{QueryIndexOutOfRangeSnafu, Result};

#[derive(Debug, Default)]
struct QuerySlot {
    accumulated: Duration,
}

/// Fixed pool of duration query slots.
#[derive(Debug)]
pub struct QueryPool {
    slots: Vec<Mutex<QuerySlot>>,
}

impl QueryPool {
    pub fn new(count: usize) -> Self {
        Self { slots: (0..count).map(|_| Mutex::new(QuerySlot::default())).collect() }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Validate that `index` names a slot.
    pub fn ensure_slot(&self, index: usize) -> Result<()> {
        ensure!(index < self.slots.len(), QueryIndexOutOfRangeSnafu { index, count: self.slots.len() });
        Ok(())
    }

    /// Add elapsed wall-clock time to a slot.
    pub fn add_duration(&self, index: usize, elapsed: Duration) -> Result<()> {
        self.ensure_slot(index)?;
        self.slots[index].lock().accumulated += elapsed;
        Ok(())
    }

    /// Accumulated duration of a slot.
    pub fn duration_at(&self, index: usize) -> Result<Duration> {
        self.ensure_slot(index)?;
        Ok(self.slots[index].lock().accumulated)
    }

    /// Zero `count` slots starting at `first`.
    pub fn reset(&self, first: usize, count: usize) -> Result<()> {
        ensure!(
            first.checked_add(count).is_some_and(|end| end <= self.slots.len()),
            QueryIndexOutOfRangeSnafu { index: first.saturating_add(count), count: self.slots.len() }
        );
        for slot in &self.slots[first..first + count] {
            slot.lock().accumulated = Duration::ZERO;
        }
        Ok(())
    }
}
