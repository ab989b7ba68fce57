//! Error taxonomy for the negotiation engine.
//!
//! One variant per kind distinguished in the error-handling design: callers
//! match on the kind to classify the outcome rather than parsing message
//! text. See [`NegotiationEngine`](crate::engine::NegotiationEngine) for the
//! propagation policy (which kinds are swallowed at which stage vs.
//! surfaced to the caller).

use std::error::Error;
use std::fmt;

/// An error raised anywhere in the negotiation engine or its pluggable
/// collaborators.
///
/// # Example
///
/// ```rust
/// use negotiant::errors::NegotiationError;
///
/// let err = NegotiationError::Skill("invalid tool name 'frobnicate'".into());
/// assert_eq!(err.to_string(), "skill error: invalid tool name 'frobnicate'");
/// ```
#[derive(Debug, Clone)]
pub enum NegotiationError {
    /// Missing required dependency or duplicate registration, raised only at
    /// configuration time (e.g. from [`EngineBuilder::build`](crate::builder::EngineBuilder::build)
    /// or [`NegotiationEngine::register_tool_handler`](crate::engine::NegotiationEngine::register_tool_handler)).
    Config(String),

    /// Text-to-vector encoding failed, including empty input. Raised by the
    /// [`Encoder`](crate::protocols::Encoder); fatal.
    Encoding(String),

    /// The [`AgentAdapter`](crate::protocols::AgentAdapter) failed to fetch a
    /// profile or produce a chat response. Swallowed everywhere it's raised,
    /// including a Formulation profile fetch, which degrades the same way a
    /// Formulation skill failure does rather than failing the negotiation.
    Adapter(String),

    /// A skill produced malformed or missing output. Fatal for Formulation,
    /// Center, and GapRecursion; logged-and-swallowed for SubNegotiation and
    /// Offer.
    Skill(String),

    /// Transport-level LLM failure. Surfaced to callers as a skill error.
    Llm(String),

    /// An attempted state transition is not present in the transition graph.
    /// Always a programming error; always fatal.
    InvalidStateTransition(String),
}

impl fmt::Display for NegotiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationError::Config(msg) => write!(f, "config error: {}", msg),
            NegotiationError::Encoding(msg) => write!(f, "encoding error: {}", msg),
            NegotiationError::Adapter(msg) => write!(f, "adapter error: {}", msg),
            NegotiationError::Skill(msg) => write!(f, "skill error: {}", msg),
            NegotiationError::Llm(msg) => write!(f, "llm error: {}", msg),
            NegotiationError::InvalidStateTransition(msg) => {
                write!(f, "invalid state transition: {}", msg)
            }
        }
    }
}

impl Error for NegotiationError {}

impl From<NegotiationError> for String {
    fn from(err: NegotiationError) -> Self {
        err.to_string()
    }
}
