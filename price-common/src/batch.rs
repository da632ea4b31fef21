use std::sync::Arc;

use futures::future::join_all;
use metrics::{counter, histogram};
use tracing::{instrument, warn};

use crate::dedup::{DedupEngine, DedupOutcome};
use crate::fingerprint::ReporterFingerprint;
use crate::metrics::{BATCH_SIZE, DEDUP_OUTCOMES, NEW_CONTRIBUTORS, REPORTS_RECEIVED};
use crate::report::NormalizedReport;
use crate::store::ObservationStore;

/// Tally of one processed batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchOutcome {
    /// What the client is told was accepted: the whole batch.
    pub accepted: usize,
    pub persisted: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Nothing had been stored for this reporter before this batch.
    pub new_contributor: bool,
}

impl BatchOutcome {
    fn record(&mut self, outcome: DedupOutcome) {
        match outcome {
            DedupOutcome::Persisted => self.persisted += 1,
            DedupOutcome::Unchanged => self.unchanged += 1,
            DedupOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Fans a validated batch out to the dedup engine and waits for every decision.
#[derive(Clone)]
pub struct BatchCoordinator {
    store: Arc<dyn ObservationStore + Send + Sync>,
    dedup: DedupEngine,
}

impl BatchCoordinator {
    pub fn new(store: Arc<dyn ObservationStore + Send + Sync>, dedup: DedupEngine) -> Self {
        Self { store, dedup }
    }

    #[instrument(skip_all, fields(batch_size = batch.len()))]
    pub async fn process(
        &self,
        batch: &[NormalizedReport],
        reporter: &ReporterFingerprint,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            accepted: batch.len(),
            ..Default::default()
        };

        if batch.is_empty() {
            return outcome;
        }

        counter!(REPORTS_RECEIVED).increment(batch.len() as u64);
        histogram!(BATCH_SIZE).record(batch.len() as f64);

        // Must run before any decision lands, or this batch's own inserts would
        // make every reporter look known.
        outcome.new_contributor = match self.store.reporter_exists(reporter).await {
            Ok(exists) => !exists,
            Err(error) => {
                warn!("failed to check for known reporter: {}", error);
                false
            }
        };
        if outcome.new_contributor {
            counter!(NEW_CONTRIBUTORS).increment(1);
        }

        let decisions = join_all(
            batch
                .iter()
                .map(|report| self.dedup.decide(report, reporter)),
        )
        .await;

        for (report, decision) in batch.iter().zip(decisions) {
            match decision {
                Ok(decision) => {
                    counter!(DEDUP_OUTCOMES, "outcome" => decision.as_str()).increment(1);
                    outcome.record(decision);
                }
                Err(error) => {
                    warn!(
                        sku_id = %report.sku_id,
                        store_id = %report.store_id,
                        "failed to process price report: {}",
                        error
                    );
                    counter!(DEDUP_OUTCOMES, "outcome" => "failed").increment(1);
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }
}
