//! Cosine similarity and deterministic neighbor ordering.

use std::cmp::Ordering;

use crate::types::Neighbor;

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when the lengths differ or either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Neighbor order: descending score, then ascending id.
pub fn neighbor_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort neighbors deterministically and keep the top `k`.
pub fn rank_neighbors(mut neighbors: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    neighbors.sort_by(neighbor_order);
    neighbors.truncate(k);
    neighbors
}

/// Score every candidate against `query` and keep the top `k`.
pub fn top_k<'a, I>(query: &[f32], candidates: I, k: usize) -> Vec<Neighbor>
where
    I: IntoIterator<Item = (&'a str, &'a [f32])>,
{
    let scored = candidates
        .into_iter()
        .map(|(id, vector)| Neighbor::new(id, cosine_similarity(query, vector)))
        .collect();
    rank_neighbors(scored, k)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cosine_identical() {
        let v = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_rank_neighbors_ties_by_id() {
        let ranked = rank_neighbors(
            vec![
                Neighbor::new("c", 0.5),
                Neighbor::new("a", 0.5),
                Neighbor::new("b", 0.9),
            ],
            10,
        );
        let ids: Vec<_> = ranked.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_top_k_truncates() {
        let vectors = [
            ("x", vec![1.0f32, 0.0]),
            ("y", vec![0.0, 1.0]),
            ("z", vec![1.0, 1.0]),
        ];
        let result = top_k(
            &[1.0, 0.0],
            vectors.iter().map(|(id, v)| (*id, v.as_slice())),
            2,
        );
        let ids: Vec<_> = result.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "z"]);
    }

    proptest! {
        #[test]
        fn prop_rank_neighbors_ordered_and_bounded(
            scores in proptest::collection::vec(-1.0f32..1.0, 0..40),
            k in 1usize..20,
        ) {
            let neighbors: Vec<Neighbor> = scores
                .iter()
                .enumerate()
                .map(|(i, s)| Neighbor::new(format!("id-{i:03}"), *s))
                .collect();
            let ranked = rank_neighbors(neighbors, k);

            prop_assert!(ranked.len() <= k);
            for pair in ranked.windows(2) {
                let ordered = pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].id < pair[1].id);
                prop_assert!(ordered);
            }
        }
    }
}
