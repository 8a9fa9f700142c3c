//! Folding a guest's session cart into their user cart at sign-in.

use common::{ProductId, SessionId, UserId};
use domain::CartOwner;
use serde::Serialize;
use store::Store;

use crate::cart::{CartService, SessionCarts};
use crate::error::Result;

/// What happened to one guest line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LineOutcome {
    Merged { quantity: u32 },
    Dropped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedLine {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub outcome: LineOutcome,
}

/// Per-line result of a merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub lines: Vec<MergedLine>,
}

impl MergeReport {
    pub fn merged_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| matches!(line.outcome, LineOutcome::Merged { .. }))
            .count()
    }

    pub fn dropped_count(&self) -> usize {
        self.lines.len() - self.merged_count()
    }
}

/// Moves session cart lines into a user cart.
///
/// The session's lines are taken out of the registry before any is added, so
/// a repeated merge of the same session cannot add them twice. Each line is
/// added on its own. A line that cannot be added is dropped and reported,
/// never retried. Once every line was attempted the session is discarded,
/// including anything a guest request put there while the merge ran.
#[derive(Clone)]
pub struct CartMerger<S> {
    carts: CartService<S>,
    sessions: SessionCarts,
}

impl<S: Store + Clone> CartMerger<S> {
    pub fn new(carts: CartService<S>) -> Self {
        let sessions = carts.sessions().clone();
        Self { carts, sessions }
    }

    #[tracing::instrument(skip(self))]
    pub async fn merge(&self, session_id: SessionId, user_id: UserId) -> Result<MergeReport> {
        let lines = self.sessions.take(session_id).await;
        let mut report = MergeReport::default();

        for line in lines {
            let outcome = match self
                .carts
                .add_item(CartOwner::User(user_id), line.product_id, i64::from(line.quantity))
                .await
            {
                Ok(_) => LineOutcome::Merged {
                    quantity: line.quantity,
                },
                Err(err) => {
                    tracing::warn!(
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        error = %err,
                        "dropping guest cart line"
                    );
                    metrics::counter!("cart_merge_lines_dropped_total").increment(1);
                    LineOutcome::Dropped {
                        reason: err.to_string(),
                    }
                }
            };
            report.lines.push(MergedLine {
                product_id: line.product_id,
                outcome,
            });
        }

        if self.sessions.discard(session_id).await {
            tracing::debug!("discarded guest lines added during merge");
        }

        tracing::info!(
            merged = report.merged_count(),
            dropped = report.dropped_count(),
            "guest cart merged"
        );
        Ok(report)
    }
}
