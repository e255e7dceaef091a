//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use tokio::time::Instant;

use crate::debug::Debug;
use crate::packet::consts::{CONTEXT_ID_MAX, CONTEXT_ID_MIN};

const NUM_CONTEXT_IDS: usize = (CONTEXT_ID_MAX - CONTEXT_ID_MIN + 1) as usize;

// Allocation state of a 6LoWPAN Context ID.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContextIdState {
    Unallocated,
    InUse,
    PendingRemoval(Instant),
}

// Tracker of the 6LoWPAN Context IDs shared by the whole mesh.
//
// A Context ID that is no longer referenced is held for the reuse delay
// before it can be allocated again.
#[derive(Clone, Debug)]
pub struct ContextIds {
    slots: [ContextIdState; NUM_CONTEXT_IDS],
    reuse_delay: Duration,
}

// ===== impl ContextIds =====

impl ContextIds {
    pub fn new(reuse_delay: Duration) -> Self {
        ContextIds {
            slots: [ContextIdState::Unallocated; NUM_CONTEXT_IDS],
            reuse_delay,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.slots = [ContextIdState::Unallocated; NUM_CONTEXT_IDS];
    }

    pub fn reuse_delay(&self) -> Duration {
        self.reuse_delay
    }

    pub(crate) fn set_reuse_delay(&mut self, reuse_delay: Duration) {
        self.reuse_delay = reuse_delay;
    }

    pub fn state(&self, id: u8) -> Option<ContextIdState> {
        Self::index(id).map(|idx| self.slots[idx])
    }

    // Returns the lowest Context ID that is free for allocation.
    pub fn unallocated_id(&self) -> Option<u8> {
        self.slots
            .iter()
            .position(|state| *state == ContextIdState::Unallocated)
            .map(|idx| CONTEXT_ID_MIN + idx as u8)
    }

    // Marks the Context ID as in use, canceling any pending removal.
    pub(crate) fn mark_as_in_use(&mut self, id: u8) {
        let Some(idx) = Self::index(id) else {
            return;
        };
        if self.slots[idx] != ContextIdState::InUse {
            Debug::ContextIdInUse(id).log();
        }
        self.slots[idx] = ContextIdState::InUse;
    }

    // Schedules the removal of a Context ID that is in use.
    pub(crate) fn schedule_to_remove(&mut self, id: u8, now: Instant) {
        let Some(idx) = Self::index(id) else {
            return;
        };
        if self.slots[idx] != ContextIdState::InUse {
            return;
        }
        Debug::ContextIdScheduleRemoval(id, self.reuse_delay).log();
        self.slots[idx] = ContextIdState::PendingRemoval(now + self.reuse_delay);
    }

    // Returns the earliest pending removal deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter_map(|state| match state {
                ContextIdState::PendingRemoval(deadline) => Some(*deadline),
                _ => None,
            })
            .min()
    }

    // Frees all Context IDs whose removal deadline has been reached,
    // returning them in ascending order.
    pub(crate) fn release_expired(&mut self, now: Instant) -> Vec<u8> {
        let mut released = vec![];
        for (idx, state) in self.slots.iter_mut().enumerate() {
            match *state {
                ContextIdState::PendingRemoval(deadline) if deadline <= now => {
                    *state = ContextIdState::Unallocated;
                    released.push(CONTEXT_ID_MIN + idx as u8);
                }
                _ => (),
            }
        }
        released
    }

    fn index(id: u8) -> Option<usize> {
        (CONTEXT_ID_MIN..=CONTEXT_ID_MAX)
            .contains(&id)
            .then(|| (id - CONTEXT_ID_MIN) as usize)
    }
}

// ===== unit tests =====
