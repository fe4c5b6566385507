//! A process-wide, run-scoped LLM completion cache keyed by
//! `blake3(prompt || schema_fingerprint || model_name)` (§4.5 "Caching", §9
//! "LLM caching"). Implemented as a decorator over `LlmService` so it's
//! invisible to the validation engine above it; entries are scoped to a
//! `run_id` to avoid cross-run leakage when tests share a process.

use crate::validation::llm::{CompletionRequest, LlmService, LlmValidationResponse};
use dashmap::DashMap;

fn cache_key(run_id: &str, request: &CompletionRequest) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(run_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(request.prompt.as_bytes());
    hasher.update(b"\0");
    hasher.update(request.response_schema.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(request.model_name.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Wraps an `LlmService`, memoising completions for the lifetime of one run.
pub struct CachingLlmService<S: LlmService> {
    inner: S,
    run_id: String,
    entries: DashMap<String, LlmValidationResponse>,
}

impl<S: LlmService> CachingLlmService<S> {
    pub fn new(inner: S, run_id: impl Into<String>) -> Self {
        Self {
            inner,
            run_id: run_id.into(),
            entries: DashMap::new(),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.entries.len()
    }
}

impl<S: LlmService> LlmService for CachingLlmService<S> {
    fn complete(&self, request: &CompletionRequest) -> anyhow::Result<LlmValidationResponse> {
        let key = cache_key(&self.run_id, request);
        if let Some(hit) = self.entries.get(&key) {
            return Ok(hit.clone());
        }
        let response = self.inner.complete(request)?;
        self.entries.insert(key, response.clone());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::llm::response_schema;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingService {
        calls: Arc<AtomicUsize>,
    }

    impl LlmService for CountingService {
        fn complete(&self, _request: &CompletionRequest) -> anyhow::Result<LlmValidationResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(LlmValidationResponse::default())
        }
    }

    #[test]
    fn identical_requests_within_a_run_hit_the_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingLlmService::new(
            CountingService {
                calls: Arc::clone(&calls),
            },
            "run1",
        );
        let request = CompletionRequest {
            prompt: "validate these findings".into(),
            response_schema: response_schema(),
            model_name: "test-model".into(),
        };

        cache.complete(&request).unwrap();
        cache.complete(&request).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached_len(), 1);
    }

    #[test]
    fn different_runs_do_not_share_cache_entries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let request = CompletionRequest {
            prompt: "validate these findings".into(),
            response_schema: response_schema(),
            model_name: "test-model".into(),
        };

        let run1 = CachingLlmService::new(
            CountingService {
                calls: Arc::clone(&calls),
            },
            "run1",
        );
        let run2 = CachingLlmService::new(
            CountingService {
                calls: Arc::clone(&calls),
            },
            "run2",
        );

        run1.complete(&request).unwrap();
        run2.complete(&request).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
