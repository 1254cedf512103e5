//! Event-driven simulation kernel for agent-based epidemiological models.
//!
//! This crate implements the modified Next Reaction Method (mNRM) core
//! described in the surrounding specification: a population container
//! with gender-partitioned O(1) indexing, a per-agent event index, the
//! hazard-integration/inversion time-translation machinery, and a
//! deletion-safe event lifecycle that can optionally fan out over
//! `rayon` for both event-time recomputation and earliest-event
//! selection.
//!
//! Concrete domain events — transmission hazards, mortality curves,
//! debut, partnership formation, seeding, periodic logging,
//! interventions — are deliberately out of scope. They are external
//! collaborators that implement [`event::SimEvent`]; see the
//! `demos/` binary for two minimal illustrative events exercising the
//! kernel end to end.

pub mod agent;
pub mod algorithm;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod event;
pub mod population;
pub mod rng;

pub use agent::{Agent, AgentEventSet, AgentId, AgentKind};
pub use algorithm::{Algorithm, TerminationReason};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use event::{Participants, SimEvent};
pub use population::Population;
pub use rng::{ChaChaRng, RngSource};
