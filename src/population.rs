//! The agent registry and event arena (§3.1, §4.1, §4.2).
//!
//! `Population<C>` owns every agent and event the kernel knows about.
//! Agents live in a sharded store keyed by [`AgentId`]; a separate,
//! plain `Vec<AgentId>` — the *registry* — holds the ordered
//! `[dummies | males | females]` partition and is mutated only by the
//! serial dispatcher (§5), exactly mirroring
//! `Population::addNewPerson` / `Population::setPersonDied` in
//! `examples/original_source/src/lib/core/population.cpp`.
//!
//! `C` is the domain context handed to hazard callbacks and `fire`
//! (spec §9's "shared configuration handle"); the kernel never
//! inspects it.

use crate::agent::{Agent, AgentId, AgentKind};
use crate::concurrency::ShardedStore;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::event::{EventHandle, EventId, EventRecord, SimEvent};
use crate::rng::RngSource;
use std::sync::Mutex;

/// The kernel always runs with exactly one global-dummy agent, matching
/// `m_numGlobalDummies = 1` in the original source.
const NUM_GLOBAL_DUMMIES: usize = 1;

/// Agent registry and event arena.
pub struct Population<C> {
    /// Domain context threaded through to hazard callbacks and `fire`.
    pub context: C,

    agents: ShardedStore<AgentId, Agent>,
    /// `[dummies(1) | males | females]`, contiguous.
    registry: Vec<AgentId>,
    num_males: usize,
    num_females: usize,
    deceased: Vec<AgentId>,

    events: ShardedStore<EventId, EventRecord<C>>,
    deletion_queue: Mutex<Vec<EventId>>,
    deletion_threshold: usize,

    next_agent_id: u64,
    next_event_id: u64,

    rng: Mutex<Box<dyn RngSource + Send>>,
    parallel: bool,
    t_now: f64,
}

impl<C> Population<C> {
    /// Construct a new population with default sharding (256 shards,
    /// 10,000-item deferred-deletion threshold), pre-populated with the
    /// single global-dummy agent (§6 `Population::new`).
    pub fn new(parallel: bool, rng: impl RngSource + Send + 'static, context: C) -> Self {
        Self::with_config(parallel, rng, context, &EngineConfig::default())
    }

    /// Construct with explicit engine tunables.
    pub fn with_config(
        parallel: bool,
        rng: impl RngSource + Send + 'static,
        context: C,
        config: &EngineConfig,
    ) -> Self {
        let agents = ShardedStore::new(config.agent_shards);
        let events = ShardedStore::new(config.event_shards);

        let mut registry = Vec::with_capacity(NUM_GLOBAL_DUMMIES);
        let mut next_agent_id = 0u64;
        for _ in 0..NUM_GLOBAL_DUMMIES {
            let id = AgentId(next_agent_id);
            next_agent_id += 1;
            let mut dummy = Agent::new(id, AgentKind::GlobalDummy);
            dummy.set_list_index(Some(registry.len()));
            registry.push(id);
            agents.insert(id, dummy);
        }

        log::debug!(
            "population initialized: parallel={parallel}, agent_shards={}, event_shards={}",
            config.agent_shards,
            config.event_shards
        );

        Self {
            context,
            agents,
            registry,
            num_males: 0,
            num_females: 0,
            deceased: Vec::new(),
            events,
            deletion_queue: Mutex::new(Vec::new()),
            deletion_threshold: config.deletion_threshold,
            next_agent_id,
            next_event_id: 0,
            rng: Mutex::new(Box::new(rng)),
            parallel,
            t_now: 0.0,
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn t_now(&self) -> f64 {
        self.t_now
    }

    pub(crate) fn set_t_now(&mut self, t: f64) {
        self.t_now = t;
    }

    // --- Agent registry (§4.1) -------------------------------------------------

    /// Add a new living agent (male or female) to the tail of its
    /// partition, swapping the first female to the new tail first if
    /// inserting a male — this keeps `[dummies | males | females]`
    /// contiguous in O(1), mirroring `Population::addNewPerson`.
    pub fn add_agent(&mut self, kind: AgentKind) -> AgentId {
        assert!(
            kind != AgentKind::GlobalDummy,
            "add_agent is for living agents only"
        );

        let id = AgentId(self.next_agent_id);
        self.next_agent_id += 1;
        let mut agent = Agent::new(id, kind);

        match kind {
            AgentKind::Male => {
                if self.num_females == 0 {
                    let idx = self.registry.len();
                    agent.set_list_index(Some(idx));
                    self.registry.push(id);
                } else {
                    let first_female_idx = NUM_GLOBAL_DUMMIES + self.num_males;
                    let first_female = self.registry[first_female_idx];
                    let moved_idx = self.registry.len();
                    self.registry.push(first_female);
                    self.agents
                        .with_mut(first_female, |a| a.set_list_index(Some(moved_idx)))
                        .expect("moved female must be registered");

                    agent.set_list_index(Some(first_female_idx));
                    self.registry[first_female_idx] = id;
                }
                self.num_males += 1;
            }
            AgentKind::Female => {
                let idx = self.registry.len();
                agent.set_list_index(Some(idx));
                self.registry.push(id);
                self.num_females += 1;
            }
            AgentKind::GlobalDummy => unreachable!(),
        }

        self.agents.insert(id, agent);
        id
    }

    /// Retire a living agent: swap-with-last within its partition, then
    /// (if male) fill the vacated male-tail slot with the last female —
    /// mirrors `Population::setPersonDied`.
    pub fn mark_died(&mut self, id: AgentId) -> EngineResult<()> {
        let list_index = self
            .agents
            .with(id, |a| a.list_index())
            .flatten()
            .ok_or_else(|| {
                EngineError::ProgrammerError(format!(
                    "mark_died: agent {id:?} is not a living registry member"
                ))
            })?;

        let kind = self
            .agents
            .with(id, |a| a.kind())
            .ok_or_else(|| EngineError::ProgrammerError(format!("unknown agent {id:?}")))?;

        match kind {
            AgentKind::Female => {
                let last_female_idx = NUM_GLOBAL_DUMMIES + self.num_males + self.num_females - 1;
                if last_female_idx != list_index {
                    let moved = self.registry[last_female_idx];
                    self.registry[list_index] = moved;
                    self.agents
                        .with_mut(moved, |a| a.set_list_index(Some(list_index)))
                        .expect("moved agent must be registered");
                }
                self.registry.truncate(last_female_idx);
                self.num_females -= 1;
            }
            AgentKind::Male => {
                let last_male_idx = NUM_GLOBAL_DUMMIES + self.num_males - 1;
                if last_male_idx != list_index {
                    let moved = self.registry[last_male_idx];
                    self.registry[list_index] = moved;
                    self.agents
                        .with_mut(moved, |a| a.set_list_index(Some(list_index)))
                        .expect("moved agent must be registered");
                }
                self.num_males -= 1;

                if self.num_females > 0 {
                    let new_idx = NUM_GLOBAL_DUMMIES + self.num_males;
                    let last_female_idx = NUM_GLOBAL_DUMMIES + self.num_males + self.num_females;
                    let moved = self.registry[last_female_idx];
                    self.registry[new_idx] = moved;
                    self.agents
                        .with_mut(moved, |a| a.set_list_index(Some(new_idx)))
                        .expect("moved agent must be registered");
                    self.registry
                        .truncate(NUM_GLOBAL_DUMMIES + self.num_males + self.num_females);
                } else {
                    self.registry.truncate(NUM_GLOBAL_DUMMIES + self.num_males);
                }
            }
            AgentKind::GlobalDummy => {
                return Err(EngineError::ProgrammerError(
                    "cannot mark a global-dummy agent as died".into(),
                ));
            }
        }

        let t_now = self.t_now;
        self.agents
            .with_mut(id, |a| a.mark_dead(t_now))
            .expect("agent must be registered");
        self.deceased.push(id);
        Ok(())
    }

    pub fn has_died(&self, id: AgentId) -> bool {
        self.agents.with(id, |a| a.has_died()).unwrap_or(false)
    }

    pub fn agent_kind(&self, id: AgentId) -> Option<AgentKind> {
        self.agents.with(id, |a| a.kind())
    }

    pub fn num_males(&self) -> usize {
        self.num_males
    }

    pub fn num_females(&self) -> usize {
        self.num_females
    }

    pub fn num_dummies(&self) -> usize {
        NUM_GLOBAL_DUMMIES
    }

    pub fn dummies(&self) -> &[AgentId] {
        &self.registry[0..NUM_GLOBAL_DUMMIES]
    }

    pub fn men(&self) -> &[AgentId] {
        &self.registry[NUM_GLOBAL_DUMMIES..NUM_GLOBAL_DUMMIES + self.num_males]
    }

    pub fn women(&self) -> &[AgentId] {
        &self.registry[NUM_GLOBAL_DUMMIES + self.num_males..]
    }

    /// `[males | females]`, excluding global dummies.
    pub fn iterate_alive(&self) -> &[AgentId] {
        &self.registry[NUM_GLOBAL_DUMMIES..]
    }

    pub fn deceased(&self) -> &[AgentId] {
        &self.deceased
    }

    // --- Event registration (§3.2, §6) -----------------------------------------

    /// Register a new event: assigns its id, draws `τ_internal`, and
    /// attaches it to every participant's staging list (a
    /// zero-participant event attaches to the single global dummy),
    /// mirroring `Population::onNewEvent`'s direct call to
    /// `generateNewInternalTimeDifference` before `registerPersonalEvent`.
    pub fn on_new_event(&mut self, event: Box<dyn SimEvent<C>>) -> EventId {
        let id = EventId(self.next_event_id);
        self.next_event_id += 1;

        let mut record = EventRecord::new(id, event, self.t_now);
        let participants = record.participants;

        let tau = {
            let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
            record.event.draw_internal_target(&mut **rng)
        };
        record.tau_internal = tau;
        record.tau_remaining = tau;

        self.events.insert(id, record);

        if participants.is_empty() {
            let dummy = self.registry[0];
            self.agents
                .with_mut(dummy, |a| a.events_mut().push_unsorted(id))
                .expect("global dummy must exist");
        } else {
            for agent_id in participants.iter() {
                self.agents
                    .with_mut(agent_id, |a| a.events_mut().push_unsorted(id))
                    .unwrap_or_else(|| {
                        panic!("on_new_event: unknown participant {agent_id:?}")
                    });
            }
        }

        id
    }

    // --- Sharded locking, exposed to external event authors (§4.4, §6) --------

    /// Lock the shard guarding `event`'s id. Dropping the guard is the
    /// `unlock_event` half of the pair.
    pub fn lock_event(
        &self,
        event: EventId,
    ) -> std::sync::MutexGuard<'_, std::collections::HashMap<EventId, EventRecord<C>>> {
        self.events.lock_shard(event)
    }

    /// Lock the shard guarding `agent`'s id.
    pub fn lock_agent(
        &self,
        agent: AgentId,
    ) -> std::sync::MutexGuard<'_, std::collections::HashMap<AgentId, Agent>> {
        self.agents.lock_shard(agent)
    }

    // --- Deferred deletion (§3.2, §4.3 step 8, §5) -----------------------------

    pub(crate) fn schedule_for_removal(&self, id: EventId) {
        self.events.with_mut(id, |r| r.scheduled_for_removal = true);
        self.deletion_queue
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(id);
    }

    pub fn pending_deletions(&self) -> usize {
        self.deletion_queue
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .len()
    }

    /// Drain the deferred-deletion queue if it has crossed the
    /// configured threshold (10,000 by default). Exposed so a host
    /// process can also call it between algorithm runs, per
    /// `Population::onAlgorithmLoop`'s role as a standalone hook.
    pub fn drain_if_due(&self) -> usize {
        let mut queue = self.deletion_queue.lock().unwrap_or_else(|p| p.into_inner());
        if queue.len() < self.deletion_threshold {
            return 0;
        }
        let drained = queue.len();
        for id in queue.drain(..) {
            self.events.remove(id);
        }
        drained
    }

    // --- Internals used by the dispatch loop (crate-visible only) -------------

    pub(crate) fn event_participants(&self, id: EventId) -> Option<crate::event::Participants> {
        self.events.with(id, |r| r.participants)
    }

    pub(crate) fn event_affects_everyone(&self, id: EventId) -> bool {
        self.events
            .with(id, |r| r.event.affects_everyone())
            .unwrap_or(false)
    }

    pub(crate) fn event_affects_globals(&self, id: EventId) -> bool {
        self.events
            .with(id, |r| r.event.affects_globals())
            .unwrap_or(false)
    }

    pub(crate) fn mark_other_affected(&self, id: EventId, affected: &mut Vec<AgentId>) {
        // Take the event out momentarily so we can hand `self` (minus
        // this one event) to the callback without a double borrow.
        let Some(mut record) = self.events.remove(id) else {
            return;
        };
        record.event.mark_other_affected(self, &mut |a| affected.push(a));
        self.events.insert(id, record);
    }

    /// Remove `event` from every participant's timed set (§4.3 step 3).
    pub(crate) fn detach_event(&self, event: EventId, participants: crate::event::Participants) {
        if participants.is_empty() {
            let dummy = self.registry[0];
            self.agents
                .with_mut(dummy, |a| a.events_mut().remove_timed(event));
        } else {
            for agent_id in participants.iter() {
                self.agents
                    .with_mut(agent_id, |a| a.events_mut().remove_timed(event));
            }
        }
    }

    /// Initialize a newly-staged event: compute its first `t_fire` from
    /// the `τ_internal` already drawn at `on_new_event` time, or
    /// discover it is already useless. Idempotent across threads — only
    /// the first caller to observe `initialized == false` computes it.
    pub(crate) fn init_event(&self, id: EventId) -> EngineResult<Option<EventHandle>> {
        let mut guard = self.events.lock_shard(id);
        let Some(record) = guard.get_mut(&id) else {
            return Ok(None);
        };

        if record.initialized {
            return Ok(Some(record.handle()));
        }

        if record.event.is_useless(self) {
            record.scheduled_for_removal = true;
            drop(guard);
            self.deletion_queue
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(id);
            return Ok(None);
        }

        let dt = record
            .event
            .solve_for_real_time_interval(self, record.tau_remaining, self.t_now);
        if dt < 0.0 {
            return Err(EngineError::NumericalFailure(format!(
                "solve_for_real_time_interval returned negative dt={dt} for event {id:?}"
            )));
        }

        record.t_fire = self.t_now + dt;
        record.initialized = true;
        record.last_ref_time = self.t_now;

        Ok(Some(record.handle()))
    }

    /// Recompute `event`'s remaining internal time and `t_fire` after
    /// the reference point advances to `new_ref`, or discover it has
    /// become useless and drop it (§4.2 `advance_event_times`).
    pub(crate) fn recompute_event(
        &self,
        id: EventId,
        new_ref: f64,
    ) -> EngineResult<Option<EventHandle>> {
        let mut guard = self.events.lock_shard(id);
        let Some(record) = guard.get_mut(&id) else {
            return Ok(None);
        };

        if record.scheduled_for_removal {
            return Ok(None);
        }

        if record.event.is_useless(self) {
            record.scheduled_for_removal = true;
            drop(guard);
            self.deletion_queue
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .push(id);
            return Ok(None);
        }

        if !record.initialized {
            // Not yet timed (still unsorted from this agent's point of
            // view) — leave it for `init_event` to pick up.
            return Ok(None);
        }

        let elapsed = new_ref - record.last_ref_time;
        debug_assert!(elapsed >= 0.0, "reference time must not move backwards");

        let consumed = record
            .event
            .calculate_internal_time_interval(self, record.last_ref_time, elapsed);
        record.tau_remaining = (record.tau_remaining - consumed).max(0.0);

        let dt = record
            .event
            .solve_for_real_time_interval(self, record.tau_remaining, new_ref);
        if dt < 0.0 {
            return Err(EngineError::NumericalFailure(format!(
                "solve_for_real_time_interval returned negative dt={dt} for event {id:?}"
            )));
        }

        record.t_fire = new_ref + dt;
        record.last_ref_time = new_ref;

        Ok(Some(record.handle()))
    }

    /// Detach `id` from the event arena, fire it, and enqueue it for
    /// deferred deletion (§4.3 steps 4 and 8). The event was already
    /// detached from its participants' timed sets by the dispatch loop.
    pub(crate) fn fire_event(&mut self, id: EventId, t: f64) -> EngineResult<()> {
        let Some(mut record) = self.events.remove(id) else {
            return Ok(());
        };
        let result = record.event.fire(self, t);
        record.scheduled_for_removal = true;
        self.events.insert(id, record);
        self.deletion_queue
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(id);
        result
    }

    pub(crate) fn agent_event_handle(&self, agent: AgentId) -> Option<EventHandle> {
        self.agents.with(agent, |a| a.events().earliest()).flatten()
    }

    pub(crate) fn agent_has_unsorted(&self, agent: AgentId) -> bool {
        self.agents
            .with(agent, |a| a.events().has_unsorted())
            .unwrap_or(false)
    }

    pub(crate) fn with_agent_events_mut<R>(
        &self,
        agent: AgentId,
        f: impl FnOnce(&mut crate::agent::AgentEventSet) -> R,
    ) -> Option<R> {
        self.agents.with_mut(agent, |a| f(a.events_mut()))
    }
}
