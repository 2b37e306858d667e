//! Lifecycle consolidation: tier promotion and archival.
//!
//! A scheduled batch job recomputes a priority score per memory from
//! access frequency, recency decay, and extraction confidence, then
//! moves memories between the short-term, long-term, and archived
//! tiers. Every tier move is logged with its computed metrics. The job
//! is single-flight, idempotent for a fixed `as_of`, and cancels
//! cooperatively between memories on shutdown.

use chrono::Duration;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use haia_types::{Memory, MemoryId, MemoryTier, Timestamp};

use crate::config::ConsolidationConfig;
use crate::error::Result;
use crate::store::SharedGraph;

// ─────────────────────────────────────────────────────────────────────────────
// Scoring
// ─────────────────────────────────────────────────────────────────────────────

/// Access count used as the normalization ceiling.
const ACCESS_CAP: f32 = 100.0;

/// Log-scaled access count normalized to [0, 1].
pub fn access_frequency(access_count: u32) -> f32 {
    let scaled = (1.0 + access_count as f32).ln() / (1.0 + ACCESS_CAP).ln();
    scaled.min(1.0)
}

/// Exponential recency decay with an access-adaptive half-life.
///
/// `half_life = base * (1 + ln(1 + access_count))`: more-accessed
/// memories decay slower. For a fixed access count the score is strictly
/// decreasing in elapsed time, so an older memory never outscores a
/// newer, equally-accessed one.
pub fn recency_score(elapsed_days: f32, access_count: u32, base_half_life_days: f32) -> f32 {
    let half_life = base_half_life_days * (1.0 + (1.0 + access_count as f32).ln());
    let elapsed = elapsed_days.max(0.0);
    (-(std::f32::consts::LN_2) * elapsed / half_life).exp()
}

// ─────────────────────────────────────────────────────────────────────────────
// Report Types
// ─────────────────────────────────────────────────────────────────────────────

/// One memory's evaluation during a consolidation run.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationDecision {
    pub memory_id: MemoryId,
    pub tier_before: MemoryTier,
    pub tier_after: MemoryTier,
    pub access_frequency: f32,
    pub recency_score: f32,
    pub confidence: f32,
    pub priority: f32,
    pub reason: String,
}

/// Outcome of one `consolidate_daily` run.
#[derive(Debug, Clone, Serialize)]
pub struct ConsolidationReport {
    pub as_of: Timestamp,
    /// Memories whose priority was computed this run.
    pub evaluated: usize,
    pub promoted: usize,
    pub archived: usize,
    /// True when a run was already in progress and this trigger did
    /// nothing.
    pub skipped: bool,
    /// True when the run stopped early on cooperative cancellation.
    pub cancelled: bool,
    pub decisions: Vec<ConsolidationDecision>,
}

impl ConsolidationReport {
    fn skipped(as_of: Timestamp) -> Self {
        Self {
            as_of,
            evaluated: 0,
            promoted: 0,
            archived: 0,
            skipped: true,
            cancelled: false,
            decisions: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Consolidator
// ─────────────────────────────────────────────────────────────────────────────

/// Scheduled batch job moving memories between lifecycle tiers.
pub struct Consolidator {
    store: SharedGraph,
    config: ConsolidationConfig,
    run_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

impl Consolidator {
    /// Create a new consolidator.
    pub fn new(store: SharedGraph, config: ConsolidationConfig) -> Self {
        Self {
            store,
            config,
            run_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    /// Token used to request cooperative shutdown: the run finishes the
    /// memory in hand, then stops.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Compute a memory's priority at `as_of`.
    ///
    /// `priority = access_weight * access_frequency
    ///           + recency_weight * recency_score
    ///           + confidence_weight * confidence`
    pub fn priority(&self, memory: &Memory, as_of: Timestamp) -> (f32, f32, f32) {
        let elapsed_days =
            (as_of - memory.learned_at).num_seconds().max(0) as f32 / 86_400.0;
        let frequency = access_frequency(memory.access_count);
        let recency = recency_score(
            elapsed_days,
            memory.access_count,
            self.config.base_half_life_days,
        );
        let priority = self.config.access_weight * frequency
            + self.config.recency_weight * recency
            + self.config.confidence_weight * memory.confidence;
        (frequency, recency, priority)
    }

    /// Run one consolidation pass.
    ///
    /// Short-term memories older than the grace period are promoted to
    /// long-term when their priority reaches the promotion threshold;
    /// long-term memories whose priority falls below the archival
    /// threshold move to archived. Re-entrant: a second run with the
    /// same `as_of` and no intervening accesses produces the same tier
    /// assignments. A trigger while a run is in progress returns a
    /// skipped report.
    pub async fn consolidate_daily(&self, as_of: Timestamp) -> Result<ConsolidationReport> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            info!("Consolidation already running, skipping trigger");
            return Ok(ConsolidationReport::skipped(as_of));
        };

        let mut report = ConsolidationReport {
            as_of,
            evaluated: 0,
            promoted: 0,
            archived: 0,
            skipped: false,
            cancelled: false,
            decisions: Vec::new(),
        };

        // Promotion pass: short-term memories past the grace period
        let grace_cutoff = as_of - Duration::days(self.config.grace_period_days);
        let short_term = self
            .store
            .list_by_tier(MemoryTier::ShortTerm, Some(grace_cutoff))
            .await?;

        for memory in &short_term {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.evaluated += 1;

            let (frequency, recency, priority) = self.priority(memory, as_of);
            if priority >= self.config.promotion_threshold {
                self.store.set_tier(memory.id, MemoryTier::LongTerm).await?;
                report.promoted += 1;
                let decision = self.decision(
                    memory,
                    MemoryTier::LongTerm,
                    frequency,
                    recency,
                    priority,
                    format!(
                        "priority {:.3} >= promotion threshold {:.2}",
                        priority, self.config.promotion_threshold
                    ),
                );
                info!(
                    memory_id = %decision.memory_id,
                    access_frequency = decision.access_frequency,
                    recency_score = decision.recency_score,
                    confidence = decision.confidence,
                    priority = decision.priority,
                    reason = %decision.reason,
                    "Promoted memory to long-term"
                );
                report.decisions.push(decision);
            } else {
                let decision = self.decision(
                    memory,
                    MemoryTier::ShortTerm,
                    frequency,
                    recency,
                    priority,
                    format!(
                        "priority {:.3} below promotion threshold {:.2}",
                        priority, self.config.promotion_threshold
                    ),
                );
                debug!(
                    memory_id = %decision.memory_id,
                    priority = decision.priority,
                    "Memory stays short-term"
                );
                report.decisions.push(decision);
            }
        }

        // Archival pass: cold long-term memories
        if !report.cancelled {
            let long_term = self.store.list_by_tier(MemoryTier::LongTerm, None).await?;

            for memory in &long_term {
                if self.cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                report.evaluated += 1;

                let (frequency, recency, priority) = self.priority(memory, as_of);
                if priority < self.config.archival_threshold {
                    self.store.set_tier(memory.id, MemoryTier::Archived).await?;
                    report.archived += 1;
                    let decision = self.decision(
                        memory,
                        MemoryTier::Archived,
                        frequency,
                        recency,
                        priority,
                        format!(
                            "priority {:.3} < archival threshold {:.2}",
                            priority, self.config.archival_threshold
                        ),
                    );
                    info!(
                        memory_id = %decision.memory_id,
                        access_frequency = decision.access_frequency,
                        recency_score = decision.recency_score,
                        confidence = decision.confidence,
                        priority = decision.priority,
                        reason = %decision.reason,
                        "Archived memory"
                    );
                    report.decisions.push(decision);
                } else {
                    let decision = self.decision(
                        memory,
                        MemoryTier::LongTerm,
                        frequency,
                        recency,
                        priority,
                        format!(
                            "priority {:.3} >= archival threshold {:.2}",
                            priority, self.config.archival_threshold
                        ),
                    );
                    report.decisions.push(decision);
                }
            }
        }

        info!(
            as_of = %as_of,
            evaluated = report.evaluated,
            promoted = report.promoted,
            archived = report.archived,
            cancelled = report.cancelled,
            "Consolidation run complete"
        );
        Ok(report)
    }

    fn decision(
        &self,
        memory: &Memory,
        tier_after: MemoryTier,
        frequency: f32,
        recency: f32,
        priority: f32,
        reason: String,
    ) -> ConsolidationDecision {
        ConsolidationDecision {
            memory_id: memory.id,
            tier_before: memory.tier,
            tier_after,
            access_frequency: frequency,
            recency_score: recency,
            confidence: memory.confidence,
            priority,
            reason,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
