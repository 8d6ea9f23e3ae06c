//! Reciprocal Rank Fusion over the text and image candidate lists.
//!
//! Ranks, not scores, are the fusion unit, so the two modalities never need
//! comparable score scales.
//!
//! # Algorithm
//!
//! RRF score for record `d`: `score(d) = Σ 1/(k + rank_i(d))`
//!
//! Where `rank_i(d)` is the 1-based rank of `d` in list `i` (absent lists
//! contribute nothing), and `k` is the smoothing constant (default 60).
//! Fusion is a union: a record found by only one modality still scores.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use vitrine_core::Modality;

use crate::types::{HitSource, Neighbor};

/// An id with its 1-based rank in one modality's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedId {
    /// Record identifier.
    pub id: String,
    /// 1-based rank.
    pub rank: usize,
}

impl RankedId {
    /// Create a ranked id.
    pub fn new(id: impl Into<String>, rank: usize) -> Self {
        Self {
            id: id.into(),
            rank,
        }
    }
}

/// One fused entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedEntry {
    /// Record identifier.
    pub id: String,
    /// Combined RRF score.
    pub score: f64,
    /// Rank in the text list, if present there.
    pub text_rank: Option<usize>,
    /// Rank in the image list, if present there.
    pub image_rank: Option<usize>,
}

impl FusedEntry {
    /// Which lists contributed.
    pub fn source(&self) -> HitSource {
        HitSource::from_ranks(self.text_rank, self.image_rank)
    }
}

/// The RRF contribution of a single rank.
pub fn rrf_contribution(rank: usize, k: u32) -> f64 {
    1.0 / (f64::from(k) + rank as f64)
}

/// Turn a backend's ordered neighbors into ranks (position + 1).
pub fn ranks_from_neighbors(neighbors: &[Neighbor]) -> Vec<RankedId> {
    neighbors
        .iter()
        .enumerate()
        .map(|(i, n)| RankedId::new(n.id.clone(), i + 1))
        .collect()
}

/// Fuse two ranked lists.
///
/// Output is sorted by descending score, ties by ascending id. When an id
/// repeats within one list its best rank is used.
pub fn fuse(text_ranks: &[RankedId], image_ranks: &[RankedId], k: u32) -> Vec<FusedEntry> {
    let mut ranks: HashMap<&str, (Option<usize>, Option<usize>)> = HashMap::new();

    for r in text_ranks {
        let slot = &mut ranks.entry(r.id.as_str()).or_default().0;
        *slot = Some(slot.map_or(r.rank, |prev| prev.min(r.rank)));
    }
    for r in image_ranks {
        let slot = &mut ranks.entry(r.id.as_str()).or_default().1;
        *slot = Some(slot.map_or(r.rank, |prev| prev.min(r.rank)));
    }

    let mut fused: Vec<FusedEntry> = ranks
        .into_iter()
        .map(|(id, (text_rank, image_rank))| {
            // Fixed summation order keeps symmetric rank pairs exactly equal.
            let score = text_rank.map_or(0.0, |r| rrf_contribution(r, k))
                + image_rank.map_or(0.0, |r| rrf_contribution(r, k));
            FusedEntry {
                id: id.to_string(),
                score,
                text_rank,
                image_rank,
            }
        })
        .collect();

    fused.sort_by(fused_order);
    fused
}

/// Single-modality path: same shape and scoring as fusion, one list.
pub fn rank_single(ranks: &[RankedId], modality: Modality, k: u32) -> Vec<FusedEntry> {
    match modality {
        Modality::Text => fuse(ranks, &[], k),
        Modality::Image => fuse(&[], ranks, k),
    }
}

fn fused_order(a: &FusedEntry, b: &FusedEntry) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.id.cmp(&b.id))
}

// ============================================================================
// Tests
// ============================================================================
