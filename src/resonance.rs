//! Cosine-similarity top-k candidate selection.

use async_trait::async_trait;

use crate::protocols::{ResonanceDetector, Vector};

const NORM_EPSILON: f64 = 1e-10;

fn norm(v: &Vector) -> f64 {
    (v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>()).sqrt()
}

fn dot(a: &Vector, b: &Vector) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum()
}

/// Cosine similarity, defined as 0 when either vector's norm is below
/// `1e-10` (distinguishing "no signal" from an actual negative/zero
/// correlation).
pub fn cosine_similarity(a: &Vector, b: &Vector) -> f64 {
    let (na, nb) = (norm(a), norm(b));
    if na < NORM_EPSILON || nb < NORM_EPSILON {
        return 0.0;
    }
    dot(a, b) / (na * nb)
}

/// The default [`ResonanceDetector`]: exact cosine similarity, sorted
/// descending, truncated to `k_star`.
pub struct CosineResonanceDetector;

#[async_trait]
impl ResonanceDetector for CosineResonanceDetector {
    async fn detect(
        &self,
        demand_vector: &Vector,
        agent_vectors: &[(String, Vector)],
        k_star: i64,
    ) -> Vec<(String, f64)> {
        if k_star <= 0 || agent_vectors.is_empty() {
            return Vec::new();
        }

        let demand_norm = norm(demand_vector);
        if demand_norm < NORM_EPSILON {
            return Vec::new();
        }

        // `agent_vectors`' given order is preserved here, then `sort_by` is
        // stable, so ties keep that order through to the truncated result.
        let mut scored: Vec<(String, f64)> = Vec::with_capacity(agent_vectors.len());
        for (agent_id, agent_vec) in agent_vectors {
            let agent_norm = norm(agent_vec);
            let sim = if agent_norm < NORM_EPSILON {
                0.0
            } else {
                dot(demand_vector, agent_vec) / (demand_norm * agent_norm)
            };
            scored.push((agent_id.clone(), sim));
        }

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k_star as usize);
        scored
    }
}
