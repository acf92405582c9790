//! Bounded-concurrency vector lookup.
//!
//! Fetching vectors one id at a time is the slow, I/O-bound part of a
//! clustering request. [`VectorFetcher`] spreads the lookups over a fixed
//! number of worker threads fed through bounded channels, retries failed
//! lookups with a linear backoff, and never lets one bad id abort the batch.

use crossbeam_channel::bounded;
use std::sync::Arc;
use std::time::Duration;

use crate::config::FetchConfig;
use crate::error::GatewayError;
use crate::vector::{VectorGateway, VectorId};

/// Result of a batch fetch, aligned with the requested ids.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// One slot per requested id, `None` when absent or failed
    pub vectors: Vec<Option<Vec<f32>>>,
    /// Ids the gateway does not know
    pub missing: usize,
    /// Ids whose lookup kept failing after all retries
    pub failed: usize,
}

impl FetchOutcome {
    #[must_use]
    pub fn found(&self) -> usize {
        self.vectors.iter().filter(|v| v.is_some()).count()
    }
}

enum FetchStatus {
    Found(Vec<f32>),
    Missing,
    Failed(GatewayError),
}

/// Fetches many vectors from a gateway with bounded concurrency.
pub struct VectorFetcher {
    gateway: Arc<dyn VectorGateway>,
    config: FetchConfig,
}

impl VectorFetcher {
    #[must_use]
    pub fn new(gateway: Arc<dyn VectorGateway>, config: FetchConfig) -> Self {
        Self { gateway, config }
    }

    /// Fetch every id. Results come back in request order.
    #[must_use]
    pub fn fetch_many(&self, ids: &[VectorId]) -> FetchOutcome {
        let mut outcome = FetchOutcome {
            vectors: vec![None; ids.len()],
            ..FetchOutcome::default()
        };
        if ids.is_empty() {
            return outcome;
        }

        let workers = self.config.concurrency.clamp(1, ids.len());
        let (job_tx, job_rx) = bounded::<(usize, VectorId)>(workers * 2);
        let (result_tx, result_rx) = bounded::<(usize, VectorId, FetchStatus)>(workers * 2);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (slot, id) in job_rx.iter() {
                        if result_tx.send((slot, id, self.fetch_one(id))).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            scope.spawn(move || {
                for job in ids.iter().copied().enumerate() {
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
            });

            for (slot, id, status) in result_rx.iter() {
                match status {
                    FetchStatus::Found(vector) => outcome.vectors[slot] = Some(vector),
                    FetchStatus::Missing => {
                        tracing::debug!(target: "fetch", "vector {id} not found, skipping");
                        outcome.missing += 1;
                    }
                    FetchStatus::Failed(e) => {
                        tracing::warn!(target: "fetch", "vector {id} could not be fetched: {e}");
                        outcome.failed += 1;
                    }
                }
            }
        });

        tracing::debug!(
            target: "fetch",
            "fetched {}/{} vectors with {workers} workers ({} missing, {} failed)",
            outcome.found(),
            ids.len(),
            outcome.missing,
            outcome.failed
        );
        outcome
    }

    fn fetch_one(&self, id: VectorId) -> FetchStatus {
        let mut attempt = 0;
        loop {
            match self.gateway.get_vector(id) {
                Ok(Some(vector)) => return FetchStatus::Found(vector),
                Ok(None) => return FetchStatus::Missing,
                Err(e) if attempt >= self.config.retry_attempts => return FetchStatus::Failed(e),
                Err(e) => {
                    attempt += 1;
                    tracing::trace!(target: "fetch", "retrying vector {id} (attempt {attempt}): {e}");
                    let backoff = self.config.retry_backoff_ms.saturating_mul(u64::from(attempt));
                    std::thread::sleep(Duration::from_millis(backoff));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayResult;
    use crate::vector::{Neighbor, SearchFilter};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Serves `i` as a one-element vector, fails some ids a few times first.
    struct FlakyGateway {
        failures_left: Mutex<HashMap<u32, u32>>,
        absent: Vec<u32>,
    }

    impl FlakyGateway {
        fn new(failures: &[(u32, u32)], absent: &[u32]) -> Self {
            Self {
                failures_left: Mutex::new(failures.iter().copied().collect()),
                absent: absent.to_vec(),
            }
        }
    }

    impl VectorGateway for FlakyGateway {
        fn embed(&self, _text: &str) -> GatewayResult<Vec<f32>> {
            Ok(vec![0.0])
        }

        fn get_vector(&self, id: VectorId) -> GatewayResult<Option<Vec<f32>>> {
            if let Some(left) = self.failures_left.lock().get_mut(&id.get()) {
                if *left > 0 {
                    *left -= 1;
                    return Err(GatewayError::Unavailable("timeout".into()));
                }
            }
            if self.absent.contains(&id.get()) {
                return Ok(None);
            }
            Ok(Some(vec![id.get() as f32]))
        }

        fn nearest_neighbors(
            &self,
            _query: &[f32],
            _k: usize,
            _filter: Option<&SearchFilter>,
        ) -> GatewayResult<Vec<Neighbor>> {
            Ok(Vec::new())
        }
    }

    fn config(concurrency: usize, retry_attempts: u32) -> FetchConfig {
        FetchConfig {
            concurrency,
            retry_attempts,
            retry_backoff_ms: 0,
        }
    }

    fn ids(range: std::ops::RangeInclusive<u32>) -> Vec<VectorId> {
        range.filter_map(VectorId::new).collect()
    }

    #[test]
    fn test_results_keep_request_order() {
        let fetcher = VectorFetcher::new(Arc::new(FlakyGateway::new(&[], &[])), config(4, 0));
        let outcome = fetcher.fetch_many(&ids(1..=50));

        assert_eq!(outcome.found(), 50);
        for (i, vector) in outcome.vectors.iter().enumerate() {
            assert_eq!(vector.as_deref(), Some(&[(i + 1) as f32][..]));
        }
    }

    #[test]
    fn test_missing_and_failed_are_skipped() {
        let gateway = FlakyGateway::new(&[(2, 10)], &[3]);
        let fetcher = VectorFetcher::new(Arc::new(gateway), config(2, 1));
        let outcome = fetcher.fetch_many(&ids(1..=4));

        assert_eq!(outcome.missing, 1);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.vectors[1].is_none());
        assert!(outcome.vectors[2].is_none());
        assert_eq!(outcome.found(), 2);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let gateway = FlakyGateway::new(&[(1, 2)], &[]);
        let fetcher = VectorFetcher::new(Arc::new(gateway), config(1, 2));
        let outcome = fetcher.fetch_many(&ids(1..=1));

        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.vectors[0], Some(vec![1.0]));
    }

    #[test]
    fn test_empty_request() {
        let fetcher = VectorFetcher::new(Arc::new(FlakyGateway::new(&[], &[])), config(0, 0));
        let outcome = fetcher.fetch_many(&[]);
        assert!(outcome.vectors.is_empty());
    }
}
