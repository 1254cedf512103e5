//! Whole-kernel integration tests covering the end-to-end scenarios.
//!
//! Each test builds a tiny `Population`, attaches hand-rolled events with
//! deterministic internal targets (overriding `draw_internal_target`
//! rather than relying on an RNG seed to land on a particular draw), and
//! runs the dispatch loop to termination or a fixed horizon.

use epikernel::{
    AgentId, AgentKind, Algorithm, ChaChaRng, EngineResult, Participants, Population, SimEvent,
    TerminationReason,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A unary event with a constant hazard rate and a fixed internal
/// target, so its firing time is exactly `target / rate`. Optionally
/// notifies one other agent (e.g. a partner whose own events need
/// reconsidering) via `mark_other_affected` when it fires.
struct ConstantMortality {
    agent: AgentId,
    rate: f64,
    target: f64,
    notify: Option<AgentId>,
    fired: &'static AtomicBool,
}

impl SimEvent<()> for ConstantMortality {
    fn participants(&self) -> Participants {
        Participants::Unary(self.agent)
    }
    fn is_useless(&self, population: &Population<()>) -> bool {
        population.has_died(self.agent)
    }
    fn mark_other_affected(&self, _population: &Population<()>, mark: &mut dyn FnMut(AgentId)) {
        if let Some(other) = self.notify {
            mark(other);
        }
    }
    fn draw_internal_target(&self, _rng: &mut dyn epikernel::RngSource) -> f64 {
        self.target
    }
    fn calculate_internal_time_interval(
        &self,
        _population: &Population<()>,
        _t0: f64,
        dt: f64,
    ) -> f64 {
        self.rate * dt
    }
    fn solve_for_real_time_interval(
        &self,
        _population: &Population<()>,
        delta_tau: f64,
        _t0: f64,
    ) -> f64 {
        delta_tau / self.rate
    }
    fn fire(&mut self, population: &mut Population<()>, _t: f64) -> EngineResult<()> {
        self.fired.store(true, Ordering::SeqCst);
        population.mark_died(self.agent)
    }
}

#[test]
fn empty_simulation_terminates_at_t_zero() {
    let mut population = Population::new(false, ChaChaRng::from_seed(1), ());
    let reason = Algorithm::new(&mut population).run(|_| false).unwrap();
    assert_eq!(reason, TerminationReason::Exhausted);
    assert_eq!(population.t_now(), 0.0);
    assert_eq!(population.num_males(), 0);
    assert_eq!(population.num_females(), 0);
}

#[test]
fn single_mortality_fires_at_the_deterministic_time() {
    static FIRED: AtomicBool = AtomicBool::new(false);
    let mut population = Population::new(false, ChaChaRng::from_seed(1), ());
    let agent = population.add_agent(AgentKind::Male);
    population.on_new_event(Box::new(ConstantMortality {
        agent,
        rate: 1.0,
        target: std::f64::consts::LN_2,
        notify: None,
        fired: &FIRED,
    }));

    let reason = Algorithm::new(&mut population).run(|_| false).unwrap();

    assert_eq!(reason, TerminationReason::Exhausted);
    assert!(FIRED.load(Ordering::SeqCst));
    assert!(population.has_died(agent));
    assert_eq!(population.deceased(), &[agent]);
    assert_eq!(population.num_males(), 0);
    assert!((population.t_now() - std::f64::consts::LN_2).abs() < 1e-12);
}

/// A two-participant event that becomes useless the instant either
/// participant dies, and records whether it was ever actually fired.
struct Transmission {
    from: AgentId,
    to: AgentId,
    target: f64,
    fired: &'static AtomicBool,
}

impl SimEvent<()> for Transmission {
    fn participants(&self) -> Participants {
        Participants::Binary(self.from, self.to)
    }
    fn is_useless(&self, population: &Population<()>) -> bool {
        population.has_died(self.from) || population.has_died(self.to)
    }
    fn draw_internal_target(&self, _rng: &mut dyn epikernel::RngSource) -> f64 {
        self.target
    }
    fn calculate_internal_time_interval(
        &self,
        _population: &Population<()>,
        _t0: f64,
        dt: f64,
    ) -> f64 {
        dt
    }
    fn solve_for_real_time_interval(
        &self,
        _population: &Population<()>,
        delta_tau: f64,
        _t0: f64,
    ) -> f64 {
        delta_tau
    }
    fn fire(&mut self, _population: &mut Population<()>, _t: f64) -> EngineResult<()> {
        self.fired.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn binary_event_is_discarded_without_firing_once_a_participant_dies() {
    static TRANSMISSION_FIRED: AtomicBool = AtomicBool::new(false);
    static MORTALITY_FIRED: AtomicBool = AtomicBool::new(false);

    let mut population = Population::new(false, ChaChaRng::from_seed(1), ());
    let a = population.add_agent(AgentKind::Male);
    let b = population.add_agent(AgentKind::Female);

    // B dies at t=1 (fast mortality); the transmission would otherwise
    // fire at t=10 (slow), long after B is already gone.
    population.on_new_event(Box::new(ConstantMortality {
        agent: b,
        rate: 1.0,
        target: 1.0,
        notify: Some(a),
        fired: &MORTALITY_FIRED,
    }));
    population.on_new_event(Box::new(Transmission {
        from: a,
        to: b,
        target: 10.0,
        fired: &TRANSMISSION_FIRED,
    }));

    let reason = Algorithm::new(&mut population).run(|_| false).unwrap();

    assert_eq!(reason, TerminationReason::Exhausted);
    assert!(MORTALITY_FIRED.load(Ordering::SeqCst));
    assert!(!TRANSMISSION_FIRED.load(Ordering::SeqCst));
    assert!(population.has_died(b));
    assert!(!population.has_died(a));
}

/// A zero-participant, `affects_everyone` event with a fixed internal
/// target and an identity hazard: it fires at exactly `t = target`.
/// Firing doubles a shared rate multiplier every other event reads.
struct RateDoublingEvent {
    target: f64,
    multiplier: &'static AtomicU64,
}

impl SimEvent<()> for RateDoublingEvent {
    fn participants(&self) -> Participants {
        Participants::Global
    }
    fn affects_everyone(&self) -> bool {
        true
    }
    fn draw_internal_target(&self, _rng: &mut dyn epikernel::RngSource) -> f64 {
        self.target
    }
    fn calculate_internal_time_interval(
        &self,
        _population: &Population<()>,
        _t0: f64,
        dt: f64,
    ) -> f64 {
        dt
    }
    fn solve_for_real_time_interval(
        &self,
        _population: &Population<()>,
        delta_tau: f64,
        _t0: f64,
    ) -> f64 {
        delta_tau
    }
    fn fire(&mut self, _population: &mut Population<()>, _t: f64) -> EngineResult<()> {
        self.multiplier.store(2, Ordering::SeqCst);
        Ok(())
    }
}

/// A mortality event whose hazard rate tracks a shared atomic
/// multiplier, so its firing time reflects whatever rate was in effect
/// across each sub-interval it was advanced over.
struct RateTrackingMortality {
    agent: AgentId,
    target: f64,
    multiplier: &'static AtomicU64,
}

impl SimEvent<()> for RateTrackingMortality {
    fn participants(&self) -> Participants {
        Participants::Unary(self.agent)
    }
    fn is_useless(&self, population: &Population<()>) -> bool {
        population.has_died(self.agent)
    }
    fn draw_internal_target(&self, _rng: &mut dyn epikernel::RngSource) -> f64 {
        self.target
    }
    fn calculate_internal_time_interval(
        &self,
        _population: &Population<()>,
        _t0: f64,
        dt: f64,
    ) -> f64 {
        self.multiplier.load(Ordering::SeqCst) as f64 * dt
    }
    fn solve_for_real_time_interval(
        &self,
        _population: &Population<()>,
        delta_tau: f64,
        _t0: f64,
    ) -> f64 {
        delta_tau / self.multiplier.load(Ordering::SeqCst) as f64
    }
    fn fire(&mut self, population: &mut Population<()>, _t: f64) -> EngineResult<()> {
        population.mark_died(self.agent)
    }
}

#[test]
fn affects_everyone_event_recomputes_every_other_events_firing_time() {
    static MULTIPLIER: AtomicU64 = AtomicU64::new(1);

    let mut population = Population::new(false, ChaChaRng::from_seed(1), ());
    let men: Vec<AgentId> = (0..3).map(|_| population.add_agent(AgentKind::Male)).collect();

    // Global event fires at t=1 (identity hazard, fixed target 1.0) and
    // doubles the multiplier every mortality event reads.
    population.on_new_event(Box::new(RateDoublingEvent {
        target: 1.0,
        multiplier: &MULTIPLIER,
    }));

    // Each mortality event has tau_internal=3.0. With rate=1 over [0,1)
    // that consumes 1.0, leaving tau_remaining=2.0. The kernel's
    // recompute happens *after* the global event's `fire` has already
    // flipped the multiplier to 2, so the consumed amount for the
    // elapsed [0,1) window is evaluated at the post-fire rate (2):
    // consumed = 2*1 = 2, leaving tau_remaining = 1.0, and the new
    // firing time is t=1 + 1.0/2 = 1.5.
    for &agent in &men {
        population.on_new_event(Box::new(RateTrackingMortality {
            agent,
            target: 3.0,
            multiplier: &MULTIPLIER,
        }));
    }

    let reason = Algorithm::new(&mut population).run(|_| false).unwrap();

    assert_eq!(reason, TerminationReason::Exhausted);
    assert_eq!(MULTIPLIER.load(Ordering::SeqCst), 2);
    for &agent in &men {
        assert!(population.has_died(agent));
    }
    assert!((population.t_now() - 1.5).abs() < 1e-9);
}

#[test]
fn mark_died_swaps_with_last_and_preserves_contiguity() {
    let mut population = Population::new(false, ChaChaRng::from_seed(1), ());
    let m1 = population.add_agent(AgentKind::Male);
    let m2 = population.add_agent(AgentKind::Male);
    let m3 = population.add_agent(AgentKind::Male);
    let w1 = population.add_agent(AgentKind::Female);
    let w2 = population.add_agent(AgentKind::Female);

    population.mark_died(m1).unwrap();

    assert_eq!(population.num_males(), 2);
    assert_eq!(population.num_females(), 2);
    assert!(population.men().contains(&m2));
    assert!(population.men().contains(&m3));
    assert!(!population.men().contains(&m1));
    assert!(population.women().contains(&w1));
    assert!(population.women().contains(&w2));
    assert_eq!(population.deceased(), &[m1]);
}

/// Builds the same 8-agent population, with strictly increasing,
/// deterministic firing times (no RNG draws involved), under either
/// dispatch mode.
fn build_staggered_mortality_population(parallel: bool) -> (Population<()>, Vec<AgentId>) {
    static FLAGS: [AtomicBool; 8] = [
        AtomicBool::new(false),
        AtomicBool::new(false),
        AtomicBool::new(false),
        AtomicBool::new(false),
        AtomicBool::new(false),
        AtomicBool::new(false),
        AtomicBool::new(false),
        AtomicBool::new(false),
    ];

    let mut population = Population::new(parallel, ChaChaRng::from_seed(7), ());
    let mut agents = Vec::new();
    for i in 0..8u64 {
        let agent = population.add_agent(AgentKind::Male);
        agents.push(agent);
        population.on_new_event(Box::new(ConstantMortality {
            agent,
            rate: 1.0,
            target: 1.0 + i as f64,
            notify: None,
            fired: &FLAGS[i as usize],
        }));
    }
    (population, agents)
}

#[test]
fn parallel_and_sequential_modes_agree_on_the_first_firing() {
    // `min_by` on `(t_fire, event_id)` is associative and commutative,
    // so the globally-earliest event is the same regardless of whether
    // the reduction over agents runs serially or via rayon's
    // fold+reduce (§8 scenario 6). With strictly increasing, disjoint
    // firing times and no RNG draws, the agent created first must be
    // the first to die under both dispatch modes.
    let (mut seq_pop, seq_agents) = build_staggered_mortality_population(false);
    let (mut par_pop, par_agents) = build_staggered_mortality_population(true);

    Algorithm::new(&mut seq_pop).run(|_| false).unwrap();
    Algorithm::new(&mut par_pop).run(|_| false).unwrap();

    assert_eq!(seq_pop.deceased().first(), Some(&seq_agents[0]));
    assert_eq!(par_pop.deceased().first(), Some(&par_agents[0]));
    assert_eq!(seq_pop.deceased().len(), 8);
    assert_eq!(par_pop.deceased().len(), 8);
}
