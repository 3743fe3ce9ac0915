//! Slot registry: the pool's record of every connection it owns

use std::fmt;

/// Stable identifier of a slot within one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

pub(crate) enum SlotState<C> {
    /// Idle, holding its connection.
    Available(C),

    /// The connection is owned by a caller or in transit to a waiter.
    CheckedOut,

    /// The old connection was dead; a new one is being created.
    Replacing,
}

pub(crate) struct Slot<C> {
    id: SlotId,
    state: SlotState<C>,
}

/// Slots in insertion order. Earlier slots are preferred on acquire.
pub(crate) struct SlotRegistry<C> {
    slots: Vec<Slot<C>>,
    next_id: u64,
}

impl<C> SlotRegistry<C> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            next_id: 0,
        }
    }

    /// Check out the first available slot.
    pub(crate) fn take_first_available(&mut self) -> Option<(SlotId, C)> {
        self.slots.iter_mut().find_map(|slot| {
            if !matches!(slot.state, SlotState::Available(_)) {
                return None;
            }
            match std::mem::replace(&mut slot.state, SlotState::CheckedOut) {
                SlotState::Available(conn) => Some((slot.id, conn)),
                _ => None,
            }
        })
    }

    /// Append a slot for a freshly created connection that is already checked out.
    pub(crate) fn push_checked_out(&mut self) -> SlotId {
        let id = SlotId(self.next_id);
        self.next_id += 1;
        self.slots.push(Slot {
            id,
            state: SlotState::CheckedOut,
        });
        id
    }

    pub(crate) fn is_checked_out(&self, id: SlotId) -> bool {
        self.get(id)
            .is_some_and(|slot| matches!(slot.state, SlotState::CheckedOut))
    }

    /// Gives the connection back if the slot is not checked out.
    pub(crate) fn mark_available(&mut self, id: SlotId, conn: C) -> Result<(), C> {
        match self.get_mut(id) {
            Some(slot) if matches!(slot.state, SlotState::CheckedOut) => {
                slot.state = SlotState::Available(conn);
                Ok(())
            }
            _ => Err(conn),
        }
    }

    pub(crate) fn mark_replacing(&mut self, id: SlotId) -> bool {
        self.transition(id, SlotState::CheckedOut, SlotState::Replacing)
    }

    pub(crate) fn finish_replacing(&mut self, id: SlotId) -> bool {
        self.transition(id, SlotState::Replacing, SlotState::CheckedOut)
    }

    pub(crate) fn remove(&mut self, id: SlotId) -> bool {
        match self.slots.iter().position(|slot| slot.id == id) {
            Some(idx) => {
                // Order of the remaining slots is kept.
                let _ = self.slots.remove(idx);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn counts(&self) -> SlotCounts {
        let mut counts = SlotCounts::default();
        for slot in &self.slots {
            match slot.state {
                SlotState::Available(_) => counts.available += 1,
                SlotState::CheckedOut => counts.checked_out += 1,
                SlotState::Replacing => counts.replacing += 1,
            }
        }
        counts
    }

    fn transition(&mut self, id: SlotId, from: SlotState<C>, to: SlotState<C>) -> bool {
        match self.get_mut(id) {
            Some(slot) if std::mem::discriminant(&slot.state) == std::mem::discriminant(&from) => {
                slot.state = to;
                true
            }
            _ => false,
        }
    }

    fn get(&self, id: SlotId) -> Option<&Slot<C>> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    fn get_mut(&mut self, id: SlotId) -> Option<&mut Slot<C>> {
        self.slots.iter_mut().find(|slot| slot.id == id)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotCounts {
    pub(crate) available: usize,
    pub(crate) checked_out: usize,
    pub(crate) replacing: usize,
}
