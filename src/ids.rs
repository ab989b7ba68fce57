//! Opaque identifier generation.
//!
//! IDs are of the shape `<prefix>_<12-hex>`, where the 12 hex characters are
//! the leading 48 bits of a random v4 UUID. A prefix-less call yields the
//! bare 12-hex token.

use uuid::Uuid;

/// Generate an opaque ID, optionally namespaced by `prefix`.
///
/// # Example
///
/// ```rust
/// use negotiant::ids::generate_id;
///
/// let id = generate_id("neg");
/// assert!(id.starts_with("neg_"));
/// assert_eq!(id.len(), "neg_".len() + 12);
/// ```
pub fn generate_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    let short = &hex[..12];
    if prefix.is_empty() {
        short.to_string()
    } else {
        format!("{}_{}", prefix, short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_prefixed_ids_of_the_right_shape() {
        let id = generate_id("evt");
        assert!(id.starts_with("evt_"));
        assert_eq!(id.len(), 16);
    }

    #[test]
    fn empty_prefix_yields_bare_token() {
        let id = generate_id("");
        assert_eq!(id.len(), 12);
        assert!(!id.contains('_'));
    }

    #[test]
    fn ids_are_not_repeated() {
        let a = generate_id("x");
        let b = generate_id("x");
        assert_ne!(a, b);
    }
}
