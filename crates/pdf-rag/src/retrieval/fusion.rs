//! Reciprocal Rank Fusion of vector and keyword rankings

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::ChunkId;

/// Standard RRF rank-bias constant
pub const DEFAULT_RRF_K: f64 = 60.0;

/// A chunk after fusion, with the ranks it held in each input list (1-based)
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub chunk_id: ChunkId,
    pub score: f64,
    pub vector_rank: Option<usize>,
    pub keyword_rank: Option<usize>,
}

/// Merge two rankings with `score = Σ 1/(k + rank)`
///
/// Inputs are chunk ids in rank order; a repeated id keeps its best rank.
/// Output is sorted by descending score, then better vector rank, then better
/// keyword rank, then lower chunk id, and truncated to `limit`.
pub fn reciprocal_rank_fusion(
    vector_ids: &[ChunkId],
    keyword_ids: &[ChunkId],
    k: f64,
    limit: usize,
) -> Vec<FusedCandidate> {
    let mut fused: HashMap<ChunkId, FusedCandidate> = HashMap::new();

    for (i, id) in vector_ids.iter().enumerate() {
        let entry = fused.entry(*id).or_insert_with(|| empty(*id));
        if entry.vector_rank.is_none() {
            entry.vector_rank = Some(i + 1);
        }
    }
    for (i, id) in keyword_ids.iter().enumerate() {
        let entry = fused.entry(*id).or_insert_with(|| empty(*id));
        if entry.keyword_rank.is_none() {
            entry.keyword_rank = Some(i + 1);
        }
    }

    let mut candidates: Vec<FusedCandidate> = fused
        .into_values()
        .map(|mut c| {
            c.score = [c.vector_rank, c.keyword_rank]
                .iter()
                .flatten()
                .map(|rank| 1.0 / (k + *rank as f64))
                .sum();
            c
        })
        .collect();

    candidates.sort_by(compare);
    candidates.truncate(limit);

    tracing::debug!(
        vector = vector_ids.len(),
        keyword = keyword_ids.len(),
        fused = candidates.len(),
        "rank fusion complete"
    );
    candidates
}

fn empty(chunk_id: ChunkId) -> FusedCandidate {
    FusedCandidate {
        chunk_id,
        score: 0.0,
        vector_rank: None,
        keyword_rank: None,
    }
}

fn compare(a: &FusedCandidate, b: &FusedCandidate) -> Ordering {
    // Absent ranks sort after every present rank
    let rank = |r: Option<usize>| r.unwrap_or(usize::MAX);
    b.score
        .total_cmp(&a.score)
        .then_with(|| rank(a.vector_rank).cmp(&rank(b.vector_rank)))
        .then_with(|| rank(a.keyword_rank).cmp(&rank(b.keyword_rank)))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scores_and_order() {
        let fused = reciprocal_rank_fusion(&[1, 2, 3], &[3, 4], 60.0, 10);
        let ids: Vec<ChunkId> = fused.iter().map(|c| c.chunk_id).collect();
        // 3 appears in both lists and wins; 2 and 4 tie and 2 has a vector rank
        assert_eq!(ids, vec![3, 1, 2, 4]);

        let three = &fused[0];
        assert_eq!(three.vector_rank, Some(3));
        assert_eq!(three.keyword_rank, Some(1));
        assert!((three.score - (1.0 / 63.0 + 1.0 / 61.0)).abs() < 1e-12);
    }

    #[test]
    fn test_tie_prefers_vector_rank() {
        // 7 is rank 1 in vector only, 9 is rank 1 in keyword only: equal scores
        let fused = reciprocal_rank_fusion(&[7], &[9], 60.0, 10);
        assert_eq!(fused[0].chunk_id, 7);
        assert_eq!(fused[1].chunk_id, 9);
        assert_eq!(fused[0].score, fused[1].score);
    }

    #[test]
    fn test_truncates_to_limit() {
        let vector: Vec<ChunkId> = (0..40).collect();
        let fused = reciprocal_rank_fusion(&vector, &[], 60.0, 30);
        assert_eq!(fused.len(), 30);
        assert_eq!(fused.last().unwrap().chunk_id, 29);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(reciprocal_rank_fusion(&[], &[], 60.0, 30).is_empty());
    }

    #[test]
    fn test_duplicate_ids_keep_best_rank() {
        let fused = reciprocal_rank_fusion(&[5, 5, 6], &[], 60.0, 10);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].vector_rank, Some(1));
        assert_eq!(fused[1].vector_rank, Some(3));
    }

    proptest! {
        #[test]
        fn prop_both_lists_beat_one(r1 in 1usize..100, r2 in 1usize..100) {
            let k = DEFAULT_RRF_K;
            let both = 1.0 / (k + r1 as f64) + 1.0 / (k + r2 as f64);
            let best_single = 1.0 / (k + r1.min(r2) as f64);
            prop_assert!(both > best_single);

            // Same property through the fusion itself
            let mut vector: Vec<ChunkId> = (1000..1000 + r1 as ChunkId - 1).collect();
            vector.push(0);
            let mut keyword: Vec<ChunkId> = (2000..2000 + r2 as ChunkId - 1).collect();
            keyword.push(0);
            let fused = reciprocal_rank_fusion(&vector, &keyword, k, usize::MAX);
            let zero = fused.iter().find(|c| c.chunk_id == 0).unwrap();
            prop_assert!(zero.score > best_single);
        }

        #[test]
        fn prop_output_is_sorted_and_unique(
            vector in proptest::collection::vec(0u32..50, 0..40),
            keyword in proptest::collection::vec(0u32..50, 0..40),
        ) {
            let fused = reciprocal_rank_fusion(&vector, &keyword, DEFAULT_RRF_K, usize::MAX);
            for pair in fused.windows(2) {
                prop_assert!(compare(&pair[0], &pair[1]) == Ordering::Less);
                prop_assert!(pair[0].score >= pair[1].score);
            }
            let mut ids: Vec<ChunkId> = fused.iter().map(|c| c.chunk_id).collect();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(ids.len(), fused.len());
        }
    }
}
