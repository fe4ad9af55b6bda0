use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::FetchError;
use crate::model::{Record, RecordId, ResultSet};
use crate::provider::SearchProvider;

/// Turns a query into a validated `ResultSet`, reporting progress as the
/// artwork of the first `slot_count` usable candidates is resolved.
///
/// Rules:
/// - Provider failures propagate unchanged; there is no retry here.
/// - Candidates without an artwork reference or identifier are skipped.
/// - Repeated identifiers keep their first occurrence.
/// - Fewer than `slot_count + 1` usable records fails with `InsufficientResults`.
#[derive(Clone)]
pub struct RefreshWorker {
    provider: Arc<dyn SearchProvider>,
    slot_count: usize,
}

impl RefreshWorker {
    pub fn new(provider: Arc<dyn SearchProvider>, slot_count: usize) -> Self {
        Self {
            provider,
            slot_count,
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub async fn fetch<F>(&self, query: &str, mut on_progress: F) -> Result<ResultSet, FetchError>
    where
        F: FnMut(f64) + Send,
    {
        let raw = self.provider.search(query).await?;
        let candidates = raw.len();
        let needed = self.slot_count + 1;

        let mut seen: HashSet<RecordId> = HashSet::with_capacity(candidates);
        let mut records = Vec::with_capacity(candidates);
        let mut resolved = 0usize;

        for (position, candidate) in raw.into_iter().enumerate() {
            let Some(artwork) = candidate.artwork_url else {
                debug!(position, "skipping candidate without artwork");
                continue;
            };
            let Some(id) = candidate.id.map(RecordId::new) else {
                debug!(position, "skipping candidate without identifier");
                continue;
            };
            if !seen.insert(id.clone()) {
                debug!(position, record = %id, "skipping repeated identifier");
                continue;
            }

            records.push(Record::new(id, artwork, candidate.content));
            if resolved < self.slot_count {
                resolved += 1;
                on_progress(resolved as f64 / self.slot_count as f64);
            }
        }

        if records.len() < needed {
            return Err(FetchError::InsufficientResults {
                needed,
                available: records.len(),
            });
        }

        info!(query, candidates, usable = records.len(), "fetched result set");
        Ok(ResultSet::new(records)?)
    }
}
