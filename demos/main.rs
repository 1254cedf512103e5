//! Minimal illustrative binary exercising `epikernel`'s dispatch loop.
//!
//! The two event types defined here are deliberately small stand-ins for
//! the concrete domain events the core kernel treats as external
//! collaborators (mortality, transmission, debut, formation, seeding,
//! periodic logging, interventions — see spec §1's Non-goals): a
//! constant-hazard mortality-style event and a two-participant
//! transmission-style event. Neither models real epidemiology; they
//! exist only to drive `Algorithm::run` end to end.

use anyhow::{Context, Result};
use epikernel::{AgentId, AgentKind, Algorithm, EngineResult, Participants, Population, SimEvent};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared context threaded through every demo event's hazard and `fire`
/// callbacks (spec §9's "shared configuration handle").
struct DemoContext {
    mortality_rate: f64,
    transmission_rate: f64,
    infections: AtomicU64,
}

/// Constant-hazard mortality-style event: fires at rate `mortality_rate`
/// and removes its single participant from the population.
struct MortalityEvent {
    agent: AgentId,
}

impl SimEvent<DemoContext> for MortalityEvent {
    fn participants(&self) -> Participants {
        Participants::Unary(self.agent)
    }

    fn is_useless(&self, population: &Population<DemoContext>) -> bool {
        population.has_died(self.agent)
    }

    fn calculate_internal_time_interval(
        &self,
        population: &Population<DemoContext>,
        _t0: f64,
        dt: f64,
    ) -> f64 {
        population.context.mortality_rate * dt
    }

    fn solve_for_real_time_interval(
        &self,
        population: &Population<DemoContext>,
        delta_tau: f64,
        _t0: f64,
    ) -> f64 {
        delta_tau / population.context.mortality_rate
    }

    fn fire(&mut self, population: &mut Population<DemoContext>, t: f64) -> EngineResult<()> {
        log::debug!("agent {:?} dies at t={t:.4}", self.agent);
        population.mark_died(self.agent)
    }
}

/// Two-participant transmission-style event: fires at a constant rate
/// while both participants remain alive, and marks itself useless once
/// either has died (spec §8 scenario 3).
struct TransmissionEvent {
    from: AgentId,
    to: AgentId,
}

impl SimEvent<DemoContext> for TransmissionEvent {
    fn participants(&self) -> Participants {
        Participants::Binary(self.from, self.to)
    }

    fn is_useless(&self, population: &Population<DemoContext>) -> bool {
        population.has_died(self.from) || population.has_died(self.to)
    }

    fn calculate_internal_time_interval(
        &self,
        population: &Population<DemoContext>,
        _t0: f64,
        dt: f64,
    ) -> f64 {
        population.context.transmission_rate * dt
    }

    fn solve_for_real_time_interval(
        &self,
        population: &Population<DemoContext>,
        delta_tau: f64,
        _t0: f64,
    ) -> f64 {
        delta_tau / population.context.transmission_rate
    }

    fn fire(&mut self, population: &mut Population<DemoContext>, t: f64) -> EngineResult<()> {
        population.context.infections.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "transmission {:?} -> {:?} at t={t:.4}",
            self.from,
            self.to
        );
        Ok(())
    }
}

/// Build a small demo population: `n` men and `n` women, each man paired
/// with one woman by a mortality event on each participant and a single
/// transmission event per pair.
fn seed_population(population: &mut Population<DemoContext>, n: usize) {
    for _ in 0..n {
        let man = population.add_agent(AgentKind::Male);
        let woman = population.add_agent(AgentKind::Female);

        population.on_new_event(Box::new(MortalityEvent { agent: man }));
        population.on_new_event(Box::new(MortalityEvent { agent: woman }));
        population.on_new_event(Box::new(TransmissionEvent {
            from: man,
            to: woman,
        }));
    }
}

fn run_demo() -> Result<()> {
    let n: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(50);
    let horizon: f64 = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(20.0);

    let context = DemoContext {
        mortality_rate: 0.05,
        transmission_rate: 0.3,
        infections: AtomicU64::new(0),
    };
    let rng = epikernel::ChaChaRng::from_os_rng().context("failed to seed RNG")?;
    let mut population = Population::new(false, rng, context);

    seed_population(&mut population, n);
    log::info!(
        "seeded {n} pairs ({} men, {} women)",
        population.num_males(),
        population.num_females()
    );

    let reason = Algorithm::new(&mut population)
        .run(|t_now| t_now >= horizon)
        .context("dispatch loop failed")?;

    log::info!(
        "terminated: {reason:?}, t_now={:.4}, deceased={}, infections={}",
        population.t_now(),
        population.deceased().len(),
        population.context.infections.load(Ordering::Relaxed),
    );

    Ok(())
}

fn main() {
    env_logger::Builder::new()
        .format_timestamp_millis()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(error) = run_demo() {
        log::error!("{error:#?}");
        std::process::exit(1);
    }
}
