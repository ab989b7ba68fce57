//! The five built-in skills (§4.6): stateless, LLM-backed transformations
//! with a defined input context and output schema.

pub mod base;
pub mod center;
pub mod formulation;
pub mod gap_recursion;
pub mod offer;
pub mod sub_negotiation;

pub use center::CenterCoordinatorSkill;
pub use formulation::FormulationSkill;
pub use gap_recursion::GapRecursionSkill;
pub use offer::OfferSkill;
pub use sub_negotiation::SubNegotiationSkill;
