//! Per-slot state and slot assignment.
//!
//! Every node keeps one state cell per execution slot. A slot is owned by exactly
//! one worker for the duration of a task, so the per-cell locks never contend;
//! they only make the cells shareable across threads.

use parking_lot::{Mutex, MutexGuard};
use quiver_core::{Error, Result};

/// One lock-protected state cell per slot.
pub struct SlotCells<T> {
    cells: Vec<Mutex<T>>,
}

impl<T> SlotCells<T> {
    /// Creates `n` cells, each initialised by `init`.
    pub fn new(n: usize, mut init: impl FnMut() -> T) -> Self {
        Self {
            cells: (0..n).map(|_| Mutex::new(init())).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Locks the cell of `slot`.
    pub fn lock(&self, slot: usize) -> Result<MutexGuard<'_, T>> {
        self.cells
            .get(slot)
            .map(|cell| cell.lock())
            .ok_or_else(|| {
                Error::invalid_operation(format!(
                    "slot {} out of range, graph has {} slots",
                    slot,
                    self.cells.len()
                ))
            })
    }

    /// Visits every cell in slot order.
    pub fn for_each(&self, mut f: impl FnMut(usize, &mut T)) {
        for (slot, cell) in self.cells.iter().enumerate() {
            f(slot, &mut cell.lock());
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SlotCells<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.cells.iter().map(|c| c.lock()))
            .finish()
    }
}

/// Free slot numbers handed out to tasks.
///
/// A task pops a slot before processing entries and pushes it back when done.
#[derive(Debug)]
pub struct SlotStack {
    size: usize,
    free: Mutex<Vec<usize>>,
}

impl SlotStack {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            free: Mutex::new((0..size).rev().collect()),
        }
    }

    /// Takes a free slot.
    pub fn pop(&self) -> Result<usize> {
        self.free
            .lock()
            .pop()
            .ok_or_else(|| Error::invalid_operation("no free slot, more concurrent tasks than slots"))
    }

    /// Returns a slot to the stack.
    pub fn push(&self, slot: usize) -> Result<()> {
        let mut free = self.free.lock();
        if slot >= self.size || free.len() >= self.size || free.contains(&slot) {
            return Err(Error::invalid_operation(format!(
                "slot {} returned twice or never handed out",
                slot
            )));
        }
        free.push(slot);
        Ok(())
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }
}
