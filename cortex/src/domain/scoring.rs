// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Relevancy Scoring
//!
//! Pure functions ranking one candidate batch. No I/O and no mutation; batch
//! maxima are taken from the batch handed in, never from the whole chat.
//!
//! Short-term memories reward usage and recency:
//!
//! ```text
//! relevancy = (access + merge) / max(max_access + max_merge, 1)
//! temporal  = max(1, hours_since(created_at))
//! score     = (relevancy + 1 / temporal) / 2
//! ```
//!
//! Long-term memories reward usage and age relative to the batch:
//!
//! ```text
//! relevancy = access / max(max_access, 1)
//! temporal  = age / max(max_age, 1)
//! score     = (relevancy + temporal) / 2
//! ```
//!
//! All scores lie in `[0, 1]`.

use chrono::{DateTime, Utc};

use super::memory::{LongTermMemory, MemoryType, ScoredMemory, ShortTermMemory};

/// Fractional hours between `created_at` and `now`, clamped at zero.
pub fn hours_since(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - created_at).num_milliseconds().max(0);
    millis as f64 / 3_600_000.0
}

pub fn short_term_score(
    access_count: u32,
    merge_count: u32,
    age_hours: f64,
    max_access: u32,
    max_merge: u32,
) -> f64 {
    let denominator = (u64::from(max_access) + u64::from(max_merge)).max(1) as f64;
    let relevancy = (u64::from(access_count) + u64::from(merge_count)) as f64 / denominator;
    let temporal = age_hours.max(1.0);
    (relevancy + 1.0 / temporal) / 2.0
}

pub fn long_term_score(access_count: u32, age_hours: f64, max_access: u32, max_age_hours: f64) -> f64 {
    let relevancy = f64::from(access_count) / f64::from(max_access.max(1));
    let temporal = age_hours / max_age_hours.max(1.0);
    (relevancy + temporal) / 2.0
}

/// Score a short-term batch. Output order follows the input.
pub fn score_short_term(batch: &[ShortTermMemory], now: DateTime<Utc>) -> Vec<ScoredMemory> {
    let max_access = batch.iter().map(|m| m.access_count).max().unwrap_or(0);
    let max_merge = batch.iter().map(|m| m.merge_count).max().unwrap_or(0);

    batch
        .iter()
        .map(|memory| ScoredMemory {
            id: memory.id,
            text: memory.text.clone(),
            score: short_term_score(
                memory.access_count,
                memory.merge_count,
                hours_since(memory.created_at, now),
                max_access,
                max_merge,
            ),
            created_at: memory.created_at,
            memory_type: MemoryType::ShortTerm,
            related_context: memory.related_context.clone(),
        })
        .collect()
}

/// Score a long-term batch. Output order follows the input.
pub fn score_long_term(batch: &[LongTermMemory], now: DateTime<Utc>) -> Vec<ScoredMemory> {
    let ages: Vec<f64> = batch.iter().map(|m| hours_since(m.created_at, now)).collect();
    let max_age = ages.iter().copied().fold(0.0_f64, f64::max);
    let max_access = batch.iter().map(|m| m.access_count).max().unwrap_or(0);

    batch
        .iter()
        .zip(ages)
        .map(|(memory, age)| ScoredMemory {
            id: memory.id,
            text: memory.text.clone(),
            score: long_term_score(memory.access_count, age, max_access, max_age),
            created_at: memory.created_at,
            memory_type: MemoryType::LongTerm,
            related_context: memory.related_context.clone(),
        })
        .collect()
}

/// Stable sort best-first, then keep the first `limit`.
pub fn rank(mut scored: Vec<ScoredMemory>, limit: usize) -> Vec<ScoredMemory> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::chat::ChatId;
    use crate::domain::memory::MemoryId;
    use chrono::Duration;

    fn short_term(access: u32, merge: u32, created_at: DateTime<Utc>) -> ShortTermMemory {
        ShortTermMemory {
            id: MemoryId::new(),
            chat_id: ChatId::new(),
            text: format!("memory {access}/{merge}"),
            access_count: access,
            merge_count: merge,
            merged: merge > 0,
            merged_message_ids: vec![],
            created_at,
            active: true,
            related_context: vec![],
        }
    }

    fn long_term(access: u32, created_at: DateTime<Utc>) -> LongTermMemory {
        LongTermMemory {
            id: MemoryId::new(),
            chat_id: ChatId::new(),
            text: format!("fact {access}"),
            access_count: access,
            created_at,
            active: true,
            related_context: vec![],
        }
    }

    #[test]
    fn test_short_term_scores_stay_in_unit_interval() {
        let now = Utc::now();
        let batch = vec![
            short_term(0, 0, now),
            short_term(12, 3, now - Duration::hours(2)),
            short_term(1, 0, now - Duration::days(30)),
            short_term(40, 9, now - Duration::minutes(5)),
        ];

        for scored in score_short_term(&batch, now) {
            assert!((0.0..=1.0).contains(&scored.score), "score {} out of range", scored.score);
            assert_eq!(scored.memory_type, MemoryType::ShortTerm);
        }
    }

    #[test]
    fn test_short_term_unused_and_stale_approaches_floor() {
        let now = Utc::now();
        let batch = vec![
            short_term(0, 0, now - Duration::days(3650)),
            short_term(10, 0, now),
        ];

        let scored = score_short_term(&batch, now);
        assert!(scored[0].score < 0.001);
        // Most used and brand new.
        assert!((scored[1].score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_short_term_relevancy_is_fractional() {
        // 3 of a possible 4 usages, one hour old.
        let score = short_term_score(2, 1, 1.0, 3, 1);
        assert!((score - (0.75 + 1.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_term_recent_memories_share_the_temporal_ceiling() {
        // Anything younger than an hour counts as one hour old.
        assert_eq!(short_term_score(1, 0, 0.1, 2, 0), short_term_score(1, 0, 0.9, 2, 0));
    }

    #[test]
    fn test_long_term_scores_stay_in_unit_interval() {
        let now = Utc::now();
        let batch = vec![
            long_term(0, now),
            long_term(5, now - Duration::hours(10)),
            long_term(2, now - Duration::days(400)),
        ];

        let scored = score_long_term(&batch, now);
        for memory in &scored {
            assert!((0.0..=1.0).contains(&memory.score));
            assert_eq!(memory.memory_type, MemoryType::LongTerm);
        }
        // Zero usage and zero age sits at the floor.
        assert!(scored[0].score.abs() < 1e-6);
    }

    #[test]
    fn test_long_term_young_batch_uses_unit_denominator() {
        let score = long_term_score(0, 0.5, 0, 0.5);
        assert!((score - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batches() {
        let now = Utc::now();
        assert!(score_short_term(&[], now).is_empty());
        assert!(score_long_term(&[], now).is_empty());
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let now = Utc::now();
        let scored: Vec<ScoredMemory> = [0.9, 0.3, 0.6]
            .into_iter()
            .map(|score| ScoredMemory {
                id: MemoryId::new(),
                text: score.to_string(),
                score,
                created_at: now,
                memory_type: MemoryType::ShortTerm,
                related_context: vec![],
            })
            .collect();

        let ranked = rank(scored, 2);
        let scores: Vec<f64> = ranked.iter().map(|m| m.score).collect();
        assert_eq!(scores, vec![0.9, 0.6]);
    }

    #[test]
    fn test_rank_is_stable_for_ties() {
        let now = Utc::now();
        let first = MemoryId::new();
        let second = MemoryId::new();
        let scored = vec![
            ScoredMemory {
                id: first,
                text: "a".into(),
                score: 0.5,
                created_at: now,
                memory_type: MemoryType::ShortTerm,
                related_context: vec![],
            },
            ScoredMemory {
                id: second,
                text: "b".into(),
                score: 0.5,
                created_at: now,
                memory_type: MemoryType::LongTerm,
                related_context: vec![],
            },
        ];

        let ranked = rank(scored, 10);
        assert_eq!(ranked[0].id, first);
        assert_eq!(ranked[1].id, second);
    }
}
