// crates/atoll-reputation/src/ledger.rs
//
// ReputationLedger: bounded, decayed interaction history per peer.
//
// The ledger is the exclusive owner of every score; peers cannot mutate
// their own entry. Scores are recomputed with decay applied on every read
// and write, so a value is never staled across a decay boundary.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use atoll_core::InteractionOutcome;

use crate::decay::attenuation;

/// Neutral score assigned to peers with no interaction history.
pub const DEFAULT_SCORE: f64 = 0.5;

/// One recorded interaction with a peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub outcome: InteractionOutcome,
    pub timestamp: DateTime<Utc>,
    pub weight: f64,
}

/// Per-peer reputation state.
#[derive(Debug, Clone)]
struct ReputationEntry {
    /// Bounded ring of interactions; oldest entries are silently dropped
    /// once the buffer is full.
    history: VecDeque<Interaction>,
    /// Cached score from the last recompute.
    score: f64,
    /// When decay was last applied to the cached score.
    last_decay: DateTime<Utc>,
}

impl ReputationEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            history: VecDeque::new(),
            score: DEFAULT_SCORE,
            last_decay: now,
        }
    }

    /// Recompute the score as the weighted average of history entries,
    /// each entry's weight attenuated by `exp(-lambda * age)`.
    fn recompute(&mut self, lambda: f64, now: DateTime<Utc>) -> f64 {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for interaction in &self.history {
            let age = (now - interaction.timestamp).num_milliseconds() as f64 / 1000.0;
            let w = interaction.weight * attenuation(lambda, age);
            weighted_sum += interaction.outcome.value() * w;
            total_weight += w;
        }

        self.score = if total_weight > f64::EPSILON {
            (weighted_sum / total_weight).clamp(0.0, 1.0)
        } else {
            DEFAULT_SCORE
        };
        self.last_decay = now;
        self.score
    }
}

/// Trust scores for every peer the node has interacted with.
#[derive(Debug, Clone)]
pub struct ReputationLedger {
    entries: Arc<RwLock<HashMap<String, ReputationEntry>>>,
    /// Decay constant, per second.
    lambda: f64,
    /// Ring buffer capacity per peer.
    capacity: usize,
}

impl ReputationLedger {
    /// Create a ledger with the given decay constant (per second) and
    /// history capacity per peer.
    pub fn new(lambda: f64, capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            lambda,
            capacity,
        }
    }

    /// Record an interaction outcome for a peer and recompute its score.
    ///
    /// Returns the new score.
    pub async fn record_outcome(
        &self,
        identity: &str,
        outcome: InteractionOutcome,
        weight: f64,
    ) -> f64 {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(identity.to_string())
            .or_insert_with(|| ReputationEntry::new(now));

        if entry.history.len() == self.capacity {
            entry.history.pop_front();
        }
        entry.history.push_back(Interaction {
            outcome,
            timestamp: now,
            weight: weight.max(0.0),
        });

        let score = entry.recompute(self.lambda, now);
        tracing::debug!(
            "Reputation: {} -> {:.3} after {:?}",
            identity,
            score,
            outcome
        );
        score
    }

    /// Current score for a peer; unknown peers return the neutral
    /// default so brand-new candidates can still be evaluated.
    pub async fn score(&self, identity: &str) -> f64 {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(identity) {
            Some(entry) => entry.recompute(self.lambda, now),
            None => DEFAULT_SCORE,
        }
    }

    /// Number of peers with at least one recorded interaction.
    pub async fn tracked(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Aggregate network health: mean score across tracked peers, each
    /// weighted by the recency of its last interaction.
    ///
    /// An empty ledger reports the neutral default.
    pub async fn network_health(&self) -> f64 {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        if entries.is_empty() {
            return DEFAULT_SCORE;
        }

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for entry in entries.values_mut() {
            let score = entry.recompute(self.lambda, now);
            let last = entry
                .history
                .back()
                .map(|i| i.timestamp)
                .unwrap_or(entry.last_decay);
            let age = (now - last).num_milliseconds() as f64 / 1000.0;
            let w = attenuation(self.lambda, age);
            weighted_sum += score * w;
            total_weight += w;
        }

        if total_weight > f64::EPSILON {
            (weighted_sum / total_weight).clamp(0.0, 1.0)
        } else {
            DEFAULT_SCORE
        }
    }

    /// Best-scored peers, for status reporting.
    pub async fn top_peers(&self, limit: usize) -> Vec<(String, f64)> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let mut scored: Vec<(String, f64)> = entries
            .iter_mut()
            .map(|(identity, entry)| (identity.clone(), entry.recompute(self.lambda, now)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ReputationLedger {
        ReputationLedger::new(0.001, 50)
    }

    #[tokio::test]
    async fn unknown_peer_scores_neutral() {
        assert!((ledger().score("stranger").await - DEFAULT_SCORE).abs() < 1e-12);
    }

    #[tokio::test]
    async fn successes_raise_and_failures_lower_the_score() {
        let l = ledger();
        let up = l
            .record_outcome("peer-a", InteractionOutcome::Success, 1.0)
            .await;
        assert!(up > DEFAULT_SCORE || (up - 1.0).abs() < 1e-9);

        let l2 = ledger();
        let down = l2
            .record_outcome("peer-b", InteractionOutcome::Failure, 1.0)
            .await;
        assert!(down < DEFAULT_SCORE || down.abs() < 1e-9);
    }

    #[tokio::test]
    async fn ten_failures_converge_toward_zero() {
        let l = ledger();
        let mut score = DEFAULT_SCORE;
        for _ in 0..10 {
            score = l
                .record_outcome("peer-bad", InteractionOutcome::Failure, 1.0)
                .await;
        }
        assert!(score < 0.01, "expected near-zero score, got {}", score);
    }

    #[tokio::test]
    async fn score_stays_bounded_under_mixed_history() {
        let l = ledger();
        for i in 0..120 {
            let outcome = match i % 3 {
                0 => InteractionOutcome::Success,
                1 => InteractionOutcome::Failure,
                _ => InteractionOutcome::Neutral,
            };
            let score = l.record_outcome("peer-mixed", outcome, 2.5).await;
            assert!((0.0..=1.0).contains(&score));
        }
    }

    #[tokio::test]
    async fn history_is_bounded_by_capacity() {
        let l = ReputationLedger::new(0.001, 5);
        for _ in 0..5 {
            l.record_outcome("peer-a", InteractionOutcome::Failure, 1.0)
                .await;
        }
        // Five more successes push every failure out of the ring.
        for _ in 0..5 {
            l.record_outcome("peer-a", InteractionOutcome::Success, 1.0)
                .await;
        }
        let score = l.score("peer-a").await;
        assert!(
            (score - 1.0).abs() < 1e-9,
            "old failures should have been dropped, got {}",
            score
        );
    }

    #[tokio::test]
    async fn repeated_reads_do_not_oscillate() {
        let l = ledger();
        l.record_outcome("peer-a", InteractionOutcome::Success, 1.0)
            .await;
        l.record_outcome("peer-a", InteractionOutcome::Failure, 1.0)
            .await;

        // With no new interactions the decayed weighted average must not
        // oscillate from decay alone.
        let first = l.score("peer-a").await;
        let mut prev = first;
        for _ in 0..10 {
            let next = l.score("peer-a").await;
            assert!((next - prev).abs() < 1e-6);
            prev = next;
        }
    }

    #[tokio::test]
    async fn network_health_reflects_tracked_peers() {
        let l = ledger();
        assert!((l.network_health().await - DEFAULT_SCORE).abs() < 1e-12);

        for _ in 0..4 {
            l.record_outcome("peer-good", InteractionOutcome::Success, 1.0)
                .await;
            l.record_outcome("peer-bad", InteractionOutcome::Failure, 1.0)
                .await;
        }
        let health = l.network_health().await;
        assert!((0.0..=1.0).contains(&health));
        // One strong and one weak peer of equal recency average out.
        assert!((health - 0.5).abs() < 0.1, "got {}", health);
    }

    #[tokio::test]
    async fn top_peers_orders_by_score() {
        let l = ledger();
        l.record_outcome("peer-good", InteractionOutcome::Success, 1.0)
            .await;
        l.record_outcome("peer-bad", InteractionOutcome::Failure, 1.0)
            .await;

        let top = l.top_peers(2).await;
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, "peer-good");
        assert!(top[0].1 >= top[1].1);
    }
}
