//! A multi-agent negotiation engine.
//!
//! Given a user demand and a population of candidate agents, the engine
//! drives a staged protocol: demand enrichment (Formulation) → vector-based
//! candidate selection (Resonance) → concurrent offer collection under a
//! barrier → bounded LLM-mediated synthesis with tool dispatch (Center) →
//! optional recursive sub-negotiations, producing a final plan.
//!
//! The engine itself (state machine, barrier, synthesis loop, tool dispatch,
//! recursion, confirmation rendezvous) is the only thing this crate
//! implements end to end. The text-embedding model, the LLM provider, and
//! the per-agent chat adapter are pluggable collaborators supplied by the
//! caller through the traits in [`protocols`].
//!
//! # Example
//!
//! ```rust,no_run
//! use negotiant::builder::EngineBuilder;
//! use negotiant::models::DemandSnapshot;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (_engine, _extras) = EngineBuilder::new().build()?;
//! let _demand = DemandSnapshot::new("I need three people to help move a piano");
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ids;
pub mod models;
pub mod protocols;
pub mod resonance;
pub mod skills;

pub use engine::NegotiationEngine;
pub use errors::NegotiationError;
pub use events::{EventPusher, EventType, NegotiationEvent};
pub use models::{AgentParticipant, DemandSnapshot, NegotiationSession, NegotiationState, Offer};
