//! The handler worklist.
//!
//! An intrusive singly-linked FIFO over a dense index space, so `add`/`pop`
//! never allocate. Built as two such queues (singleton handlers and
//! ordinary handlers) so singleton handlers can be drained first when both
//! are ready.

use crate::types::CellIndex;

/// What a handler pushes a shrunk cell into while it runs. The real
/// accumulator wakes every handler watching that cell; the
/// [`DummyAccumulator`] discards everything, used by the `Or` handler
/// when it speculatively runs a disjunct on a scratch grid and must
/// not let that disjunct's pushes leak into the caller's outer worklist.
pub trait Accumulator {
    fn add_for_cell(&mut self, cell: CellIndex);
}

pub struct DummyAccumulator;

impl Accumulator for DummyAccumulator {
    #[inline]
    fn add_for_cell(&mut self, _cell: CellIndex) {}
}

struct IndexLinkedList {
    linked_list: Vec<usize>,
    head: usize,
    hold: usize,
}

impl IndexLinkedList {
    const NOT_IN_LIST: usize = usize::MAX;
    const NIL: usize = usize::MAX - 1;

    fn new(size: usize) -> IndexLinkedList {
        IndexLinkedList {
            linked_list: vec![Self::NOT_IN_LIST; size],
            head: Self::NIL,
            hold: Self::NIL,
        }
    }

    fn add(&mut self, index: usize) {
        if self.linked_list[index] == Self::NOT_IN_LIST {
            self.linked_list[index] = self.head;
            self.head = index;
        }
    }

    fn clear(&mut self) {
        while self.head != Self::NIL {
            let new_head = self.linked_list[self.head];
            self.linked_list[self.head] = Self::NOT_IN_LIST;
            self.head = new_head;
        }
        self.clear_hold();
    }

    fn clear_hold(&mut self) {
        while self.hold != Self::NIL {
            let new_hold = self.linked_list[self.hold];
            self.linked_list[self.hold] = Self::NOT_IN_LIST;
            self.hold = new_hold;
        }
    }

    fn pop(&mut self) -> Option<usize> {
        match self.head {
            Self::NIL => None,
            index => {
                self.head = self.linked_list[index];
                self.linked_list[index] = Self::NOT_IN_LIST;
                Some(index)
            }
        }
    }

    fn hold(&mut self, index: usize) {
        if self.linked_list[index] == Self::NOT_IN_LIST {
            self.linked_list[index] = self.hold;
            self.hold = index;
        }
    }

    fn contains(&self, index: usize) -> bool {
        self.linked_list[index] != Self::NOT_IN_LIST
    }
}

/// The per-session worklist of handler indices woken by recently-shrunk
/// cells, FIFO within each of the two priority bands (singletons, then
/// ordinary handlers).
pub struct HandlerAccumulator {
    cell_to_ordinary: Vec<Vec<usize>>,
    cell_to_singleton: Vec<Vec<usize>>,
    is_singleton: Vec<bool>,
    ordinary: IndexLinkedList,
    singleton: IndexLinkedList,
}

impl HandlerAccumulator {
    /// `cell_to_ordinary`/`cell_to_singleton` are the per-cell watch maps a
    /// [`crate::handler::HandlerSet`] builds while handlers are registered;
    /// `num_handlers` sizes the two FIFOs.
    pub fn new(
        num_cells: usize,
        num_handlers: usize,
        cell_to_ordinary: Vec<Vec<usize>>,
        cell_to_singleton: Vec<Vec<usize>>,
    ) -> HandlerAccumulator {
        debug_assert_eq!(cell_to_ordinary.len(), num_cells);
        debug_assert_eq!(cell_to_singleton.len(), num_cells);

        let mut is_singleton = vec![false; num_handlers];
        for handlers in &cell_to_singleton {
            for &h in handlers {
                is_singleton[h] = true;
            }
        }

        HandlerAccumulator {
            cell_to_ordinary,
            cell_to_singleton,
            is_singleton,
            ordinary: IndexLinkedList::new(num_handlers),
            singleton: IndexLinkedList::new(num_handlers),
        }
    }

    /// Pops the next handler to run: singletons drain first.
    pub fn pop(&mut self) -> Option<usize> {
        self.singleton.pop().or_else(|| self.ordinary.pop())
    }

    /// Marks `index` as currently running, so a handler that re-adds itself
    /// mid-call doesn't re-enter the same drain pass.
    pub fn hold(&mut self, index: usize) {
        self.queue_for(index).hold(index);
    }

    pub fn clear_hold(&mut self) {
        self.ordinary.clear_hold();
        self.singleton.clear_hold();
    }

    /// Drops every queued and held handler — called once a contradiction is
    /// found, since there is no point waking the rest of the worklist.
    pub fn clear(&mut self) {
        self.ordinary.clear();
        self.singleton.clear();
    }

    pub fn is_queued(&self, index: usize) -> bool {
        self.queue_for(index).contains(index)
    }

    fn queue_for(&mut self, index: usize) -> &mut IndexLinkedList {
        if self.is_singleton[index] {
            &mut self.singleton
        } else {
            &mut self.ordinary
        }
    }
}

impl Accumulator for HandlerAccumulator {
    /// Wakes every handler (singleton or ordinary) that watches `cell`.
    fn add_for_cell(&mut self, cell: CellIndex) {
        for &h in &self.cell_to_singleton[cell] {
            self.singleton.add(h);
        }
        for &h in &self.cell_to_ordinary[cell] {
            self.ordinary.add(h);
        }
    }
}
