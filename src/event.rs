//! The external event contract and the kernel-owned event record.
//!
//! `SimEvent` is the façade described in spec §4.5: the kernel only
//! ever calls through this trait and never inspects a concrete event's
//! hazard internals. `EventRecord` is the kernel's own bookkeeping
//! around a boxed `SimEvent` — internal clock, firing time, and the
//! flags from spec §3.1.

use crate::agent::AgentId;
use crate::concurrency::ShardKey;
use crate::error::EngineResult;
use crate::population::Population;
use crate::rng::RngSource;

/// Stable, monotonically assigned identity for an event, assigned on
/// first registration (`on_new_event`). Doubles as the key used to pick
/// a lock shard (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

impl ShardKey for EventId {
    fn shard_index(&self, shard_count: usize) -> usize {
        (self.0 as usize) % shard_count
    }
}

impl ShardKey for AgentId {
    fn shard_index(&self, shard_count: usize) -> usize {
        (self.0 as usize) % shard_count
    }
}

/// The lightweight value an [`crate::agent::AgentEventSet`] keeps for a
/// timed event: just enough to order and identify it without touching
/// the event arena.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventHandle {
    pub id: EventId,
    pub t_fire: f64,
}

/// An event's static participant arity, cached once at registration
/// since spec §4.5 calls it out as `num_participants() -> {0,1,2}`.
#[derive(Debug, Clone, Copy)]
pub enum Participants {
    Global,
    Unary(AgentId),
    Binary(AgentId, AgentId),
}

impl Participants {
    pub fn len(&self) -> usize {
        match self {
            Participants::Global => 0,
            Participants::Unary(_) => 1,
            Participants::Binary(..) => 2,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = AgentId> + '_ {
        ParticipantIter {
            participants: *self,
            idx: 0,
        }
    }
}

struct ParticipantIter {
    participants: Participants,
    idx: usize,
}

impl Iterator for ParticipantIter {
    type Item = AgentId;

    fn next(&mut self) -> Option<AgentId> {
        let item = match (self.participants, self.idx) {
            (Participants::Unary(a), 0) => Some(a),
            (Participants::Binary(a, _), 0) => Some(a),
            (Participants::Binary(_, b), 1) => Some(b),
            _ => None,
        };
        if item.is_some() {
            self.idx += 1;
        }
        item
    }
}

/// The external event contract (§4.5). Every concrete domain event
/// (transmission, mortality, debut, formation, seeding, periodic
/// logging, interventions — all deliberately out of this crate's
/// scope) implements this trait; the kernel only ever calls through it.
///
/// `C` is the shared domain context handed to `fire` and the hazard
/// callbacks (spec §9's "shared configuration handle").
pub trait SimEvent<C>: Send {
    /// Static arity: 0 (global), 1 (unary), or 2 (binary).
    fn participants(&self) -> Participants;

    /// Called when the kernel wants to prune a stale event — e.g. after
    /// another event kills a prerequisite participant. `true` means the
    /// kernel detaches and discards without ever calling `fire`.
    fn is_useless(&self, _population: &Population<C>) -> bool {
        false
    }

    /// If true, firing this event recomputes every agent's event times.
    fn affects_everyone(&self) -> bool {
        false
    }

    /// If true, firing this event recomputes the global-dummy events.
    fn affects_globals(&self) -> bool {
        false
    }

    /// Called when `affects_everyone` is false: enumerate
    /// indirectly-affected agents via `mark`.
    fn mark_other_affected(&self, _population: &Population<C>, _mark: &mut dyn FnMut(AgentId)) {}

    /// Draw the internal exponential deadline. Default: `Exp(1)`.
    fn draw_internal_target(&self, rng: &mut dyn RngSource) -> f64 {
        rng.draw_exp1()
    }

    /// Integrate the hazard over `[t0, t0 + dt]`. Must be monotone
    /// nondecreasing in `dt`.
    fn calculate_internal_time_interval(&self, population: &Population<C>, t0: f64, dt: f64)
    -> f64;

    /// Invert the hazard integral: the `dt` such that integrating from
    /// `t0` over `dt` equals `delta_tau`. Return `f64::INFINITY` if no
    /// finite `dt` satisfies it — the kernel then leaves the event with
    /// `t_fire = +inf` and never selects it.
    fn solve_for_real_time_interval(
        &self,
        population: &Population<C>,
        delta_tau: f64,
        t0: f64,
    ) -> f64;

    /// Apply the event's domain effect. May call `population.add_agent`,
    /// `population.mark_died`, `population.on_new_event`.
    fn fire(&mut self, population: &mut Population<C>, t: f64) -> EngineResult<()>;
}

/// Kernel-owned bookkeeping around a boxed [`SimEvent`] (§3.1).
pub(crate) struct EventRecord<C> {
    pub event_id: EventId,
    pub participants: Participants,
    pub event: Box<dyn SimEvent<C>>,
    pub tau_internal: f64,
    pub tau_remaining: f64,
    pub t_fire: f64,
    pub initialized: bool,
    pub scheduled_for_removal: bool,
    /// The real-time point `tau_remaining` is valid relative to —
    /// i.e. the reference time as of the most recent
    /// `advance_event_times` call (or registration, before the first).
    /// Resolves spec §9's open question in favor of "the previous
    /// advance", documented in DESIGN.md.
    pub last_ref_time: f64,
}

impl<C> EventRecord<C> {
    pub(crate) fn new(event_id: EventId, event: Box<dyn SimEvent<C>>, created_at: f64) -> Self {
        let participants = event.participants();
        Self {
            event_id,
            participants,
            event,
            tau_internal: 0.0,
            tau_remaining: 0.0,
            t_fire: f64::INFINITY,
            initialized: false,
            scheduled_for_removal: false,
            last_ref_time: created_at,
        }
    }

    pub(crate) fn handle(&self) -> EventHandle {
        EventHandle {
            id: self.event_id,
            t_fire: self.t_fire,
        }
    }
}
