//! The modified Next Reaction Method dispatch loop (§4.3).
//!
//! `Algorithm::run` is the kernel's core: repeatedly pick the single
//! earliest-firing event across the whole population, fire it, and
//! propagate the consequences (participant event-time advances,
//! `affects_everyone`/`affects_globals` broadcasts, indirectly-affected
//! agents) before picking again. Mirrors the loop structure of
//! `Population::onAlgorithmLoop` /
//! `Population::getNextScheduledEvent` in
//! `examples/original_source/src/lib/core/population.cpp`, generalized
//! from that file's hardcoded HIV/HCV event handling to the external
//! [`crate::event::SimEvent`] contract.

use crate::agent::AgentId;
use crate::error::EngineResult;
use crate::event::{EventHandle, EventId, Participants};
use crate::population::Population;
use rayon::prelude::*;

/// Why [`Algorithm::run`] stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerminationReason {
    /// No event remains anywhere in the population; nothing can ever
    /// fire again.
    Exhausted,
    /// The caller-supplied `until` predicate returned `true`.
    HorizonReached,
}

/// The dispatch loop, parameterized over the same domain context `C`
/// as the population it drives.
pub struct Algorithm<'p, C> {
    population: &'p mut Population<C>,
}

impl<'p, C: Send + Sync> Algorithm<'p, C> {
    pub fn new(population: &'p mut Population<C>) -> Self {
        Self { population }
    }

    /// Run until no event remains or `until(t_now)` returns `true`.
    ///
    /// Each iteration is one full mNRM step (§4.3):
    /// 1. initialize any newly staged events,
    /// 2. select the earliest-firing event across every agent,
    /// 3. detach it from its participants' timed sets,
    /// 4. fire it,
    /// 5. advance event times for participants (and, depending on the
    ///    flags the fired event reports, everyone or the global dummy),
    /// 6. run deferred-deletion housekeeping if the queue is due.
    pub fn run(&mut self, mut until: impl FnMut(f64) -> bool) -> EngineResult<TerminationReason> {
        loop {
            if until(self.population.t_now()) {
                return Ok(TerminationReason::HorizonReached);
            }

            self.initialize_staged_events()?;

            let Some(chosen) = self.select_earliest() else {
                return Ok(TerminationReason::Exhausted);
            };

            self.step(chosen)?;
            self.population.drain_if_due();
        }
    }

    /// For every agent with events awaiting their first `t_fire`, draw
    /// the internal target and compute it (§4.2). Runs in parallel
    /// across agent shards when the population was built with
    /// `parallel = true`, mirroring rayon's fork-join stand-in for the
    /// original's per-thread-slot-then-serial-combine pattern.
    fn initialize_staged_events(&self) -> EngineResult<()> {
        let agents: Vec<AgentId> = self
            .population
            .iterate_alive()
            .iter()
            .copied()
            .chain(self.population.dummies().iter().copied())
            .filter(|id| self.population.agent_has_unsorted(*id))
            .collect();

        let init_one = |agent: AgentId| -> EngineResult<()> {
            let mut first_err = None;
            self.population.with_agent_events_mut(agent, |set| {
                set.process_unsorted(|id| match self.population.init_event(id) {
                    Ok(handle) => handle,
                    Err(e) => {
                        first_err.get_or_insert(e);
                        None
                    }
                });
            });
            match first_err {
                Some(e) => Err(e),
                None => Ok(()),
            }
        };

        if self.population.is_parallel() {
            agents
                .par_iter()
                .map(|a| init_one(*a))
                .collect::<EngineResult<Vec<()>>>()?;
        } else {
            for a in &agents {
                init_one(*a)?;
            }
        }
        Ok(())
    }

    /// Reduce over every agent's `earliest()` handle to find the single
    /// globally-earliest event, ties broken by event id (§4.3 step 2,
    /// §8). Sequential mode folds serially; parallel mode uses rayon's
    /// `fold`+`reduce` as the fork-join substitute for the original's
    /// per-thread candidate array.
    fn select_earliest(&self) -> Option<EventHandle> {
        let agents: Vec<AgentId> = self
            .population
            .iterate_alive()
            .iter()
            .copied()
            .chain(self.population.dummies().iter().copied())
            .collect();

        let pick = |a: &AgentId| self.population.agent_event_handle(*a);
        let combine = |a: Option<EventHandle>, b: Option<EventHandle>| match (a, b) {
            (None, x) => x,
            (x, None) => x,
            (Some(a), Some(b)) => {
                if (a.t_fire, a.id) <= (b.t_fire, b.id) {
                    Some(a)
                } else {
                    Some(b)
                }
            }
        };

        if self.population.is_parallel() {
            agents
                .par_iter()
                .map(pick)
                .fold(|| None, combine)
                .reduce(|| None, combine)
        } else {
            agents.iter().map(pick).fold(None, combine)
        }
    }

    /// Detach, fire, and propagate the consequences of firing `chosen`.
    fn step(&mut self, chosen: EventHandle) -> EngineResult<()> {
        let id = chosen.id;
        let Some(participants) = self.population.event_participants(id) else {
            return Ok(());
        };

        self.population.detach_event(id, participants);

        let affects_everyone = self.population.event_affects_everyone(id);
        let affects_globals = self.population.event_affects_globals(id);

        self.fire(id, chosen.t_fire)?;

        let t_fire = chosen.t_fire;

        if affects_everyone {
            self.advance_all(t_fire)?;
        } else {
            self.advance_participants(participants, t_fire)?;

            let mut other_affected = Vec::new();
            self.population.mark_other_affected(id, &mut other_affected);
            self.advance_agents(&other_affected, t_fire)?;

            if affects_globals {
                self.advance_agents(self.population.dummies(), t_fire)?;
            }
        }

        self.population.set_t_now(t_fire);

        Ok(())
    }

    fn fire(&mut self, id: EventId, t: f64) -> EngineResult<()> {
        self.population.fire_event(id, t)
    }

    fn advance_participants(&self, participants: Participants, t: f64) -> EngineResult<()> {
        for agent in participants.iter() {
            self.advance_one(agent, t)?;
        }
        Ok(())
    }

    fn advance_agents(&self, agents: &[AgentId], t: f64) -> EngineResult<()> {
        for agent in agents {
            self.advance_one(*agent, t)?;
        }
        Ok(())
    }

    fn advance_all(&self, t: f64) -> EngineResult<()> {
        let agents: Vec<AgentId> = self
            .population
            .iterate_alive()
            .iter()
            .copied()
            .chain(self.population.dummies().iter().copied())
            .collect();
        if self.population.is_parallel() {
            agents
                .par_iter()
                .map(|a| self.advance_one(*a, t))
                .collect::<EngineResult<Vec<()>>>()?;
        } else {
            for a in &agents {
                self.advance_one(*a, t)?;
            }
        }
        Ok(())
    }

    fn advance_one(&self, agent: AgentId, t: f64) -> EngineResult<()> {
        if self.population.has_died(agent) {
            return Ok(());
        }
        let ids: Vec<EventId> = self
            .population
            .with_agent_events_mut(agent, |set| set.timed().iter().map(|h| h.id).collect())
            .unwrap_or_default();

        for id in ids {
            let recomputed = self.population.recompute_event(id, t)?;
            self.population.with_agent_events_mut(agent, |set| {
                set.remove_timed(id);
                if let Some(handle) = recomputed {
                    set.push_timed(handle);
                }
            });
        }
        Ok(())
    }
}
