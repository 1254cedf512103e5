//! Agents and their per-agent event sets.
//!
//! Mirrors `PersonBase`/`Population`'s per-person event bookkeeping in
//! `examples/original_source/src/lib/core/population.cpp`: each agent
//! owns a staging list of freshly attached ("unsorted") events and a
//! collection of already-timed events, and exposes an `earliest()`
//! query the dispatch loop reduces over.

use crate::event::{EventHandle, EventId};

/// Stable, monotonically assigned identity for an [`Agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AgentId(pub u64);

/// The three partitions an agent can belong to in the registry (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// A synthetic agent with no biological role; the attachment point
    /// for zero-participant events.
    GlobalDummy,
    Male,
    Female,
}

/// A single individual (or the global dummy) tracked by the kernel.
///
/// The kernel does not know or care what a concrete simulation does
/// with an agent beyond its identity, kind, and event bookkeeping —
/// domain attributes (phenotype, sexual debut status, partner lists,
/// ...) belong to the external collaborator that wraps this type.
pub struct Agent {
    id: AgentId,
    kind: AgentKind,
    /// Position in the registry's backing vector, or `None` if deceased.
    list_index: Option<usize>,
    time_of_death: Option<f64>,
    events: AgentEventSet,
}

impl Agent {
    pub(crate) fn new(id: AgentId, kind: AgentKind) -> Self {
        Self {
            id,
            kind,
            list_index: None,
            time_of_death: None,
            events: AgentEventSet::default(),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn has_died(&self) -> bool {
        self.time_of_death.is_some()
    }

    pub fn time_of_death(&self) -> Option<f64> {
        self.time_of_death
    }

    pub fn list_index(&self) -> Option<usize> {
        self.list_index
    }

    pub(crate) fn set_list_index(&mut self, idx: Option<usize>) {
        self.list_index = idx;
    }

    pub(crate) fn mark_dead(&mut self, t_now: f64) {
        debug_assert!(!self.has_died(), "agent already marked dead");
        self.time_of_death = Some(t_now);
        self.list_index = None;
    }

    pub fn events(&self) -> &AgentEventSet {
        &self.events
    }

    pub(crate) fn events_mut(&mut self) -> &mut AgentEventSet {
        &mut self.events
    }
}

/// Per-agent collection of timed events plus a staging area of newly
/// attached events awaiting their first `t_fire` computation (§4.2).
#[derive(Default)]
pub struct AgentEventSet {
    timed: Vec<EventHandle>,
    unsorted: Vec<EventId>,
}

impl AgentEventSet {
    /// Stage a freshly attached event. Its `t_fire` is not yet known.
    pub(crate) fn push_unsorted(&mut self, id: EventId) {
        self.unsorted.push(id);
    }

    /// Drain the staging list, handing each id to `init` so the caller
    /// can initialize (draw `τ_internal`, compute `t_fire`) and report
    /// back the resulting handle. `init` returns `None` if the event
    /// turned out to be useless and should be dropped instead of moved
    /// into the timed set.
    pub(crate) fn process_unsorted(&mut self, mut init: impl FnMut(EventId) -> Option<EventHandle>) {
        for id in self.unsorted.drain(..) {
            if let Some(handle) = init(id) {
                self.timed.push(handle);
            }
        }
    }

    /// True while events await initialization (used by tests and by
    /// debug assertions that every event is initialized before
    /// selection).
    pub fn has_unsorted(&self) -> bool {
        !self.unsorted.is_empty()
    }

    pub fn timed(&self) -> &[EventHandle] {
        &self.timed
    }

    /// Attach an already-computed handle directly to the timed set,
    /// bypassing staging. Used when re-advancing an event that was
    /// already initialized.
    pub(crate) fn push_timed(&mut self, handle: EventHandle) {
        self.timed.push(handle);
    }

    /// Return the handle with the minimum `t_fire`, ties broken by the
    /// smaller `event_id` for determinism (§4.2, §8).
    pub fn earliest(&self) -> Option<EventHandle> {
        self.timed
            .iter()
            .copied()
            .min_by(|a, b| {
                a.t_fire
                    .partial_cmp(&b.t_fire)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            })
    }

    /// Unlink a handle by event id. Tolerates `id` already absent,
    /// since two participants of the same event may both call this.
    pub(crate) fn remove_timed(&mut self, id: EventId) {
        if let Some(pos) = self.timed.iter().position(|h| h.id == id) {
            self.timed.swap_remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventHandle, EventId};
    use std::collections::HashMap;

    #[test]
    fn earliest_picks_minimum_t_fire() {
        let t_fire: HashMap<u64, f64> = [(3, 5.0), (1, 2.0), (2, 9.0)].into_iter().collect();
        let mut set = AgentEventSet::default();
        for &id in t_fire.keys() {
            set.push_unsorted(EventId(id));
        }
        set.process_unsorted(|id| {
            Some(EventHandle {
                id,
                t_fire: t_fire[&id.0],
            })
        });

        let e = set.earliest().unwrap();
        assert_eq!(e.id, EventId(1));
    }

    #[test]
    fn earliest_ties_broken_by_id() {
        let mut set = AgentEventSet::default();
        set.push_unsorted(EventId(5));
        set.push_unsorted(EventId(2));
        set.process_unsorted(|id| Some(EventHandle { id, t_fire: 1.0 }));

        let e = set.earliest().unwrap();
        assert_eq!(e.id, EventId(2));
    }

    #[test]
    fn remove_timed_tolerates_missing() {
        let mut set = AgentEventSet::default();
        set.push_unsorted(EventId(1));
        set.process_unsorted(|id| Some(EventHandle { id, t_fire: 1.0 }));

        set.remove_timed(EventId(1));
        set.remove_timed(EventId(1)); // second removal is a no-op
        assert!(set.earliest().is_none());
    }

    #[test]
    fn process_unsorted_can_reject_useless_events() {
        let mut set = AgentEventSet::default();
        set.push_unsorted(EventId(1));
        set.process_unsorted(|_| None);
        assert!(set.earliest().is_none());
        assert!(!set.has_unsorted());
    }
}
