//! Engine-wide timeout and default-limit configuration.
//!
//! Mirrors `CloudLLMConfig`'s minimal plain-struct precedent: no file or
//! environment-variable parsing is introduced. Callers construct this
//! however they like, or rely on [`Default`] and override specific fields
//! through [`EngineBuilder`](crate::builder::EngineBuilder).
//!
//! # Example
//!
//! ```rust
//! use negotiant::config::EngineLimits;
//!
//! let limits = EngineLimits {
//!     offer_timeout_s: 10.0,
//!     ..EngineLimits::default()
//! };
//! assert_eq!(limits.confirmation_timeout_s, 300.0);
//! ```
#[derive(Debug, Clone, Copy)]
pub struct EngineLimits {
    /// Per-participant offer-generation timeout (§4.4).
    pub offer_timeout_s: f64,
    /// Confirmation-rendezvous timeout (§4.2).
    pub confirmation_timeout_s: f64,
    /// Default top-k candidate count for Resonance (§4.3), used when a
    /// caller does not supply `k_star` explicitly.
    pub default_k_star: i64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            offer_timeout_s: 30.0,
            confirmation_timeout_s: 300.0,
            default_k_star: 5,
        }
    }
}
