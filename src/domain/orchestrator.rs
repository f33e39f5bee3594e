//! Source orchestration: cache lookup, prioritized failover, retry, health.
//!
//! Health is a two-state machine per source. Exhausting retries moves a
//! source to unavailable on the series path (symbol-list failures only
//! record the error); only an explicit [`SourceOrchestrator::probe`] or
//! [`SourceOrchestrator::probe_all`] moves it back. The fetch path never
//! re-enables a source on its own. A rejected payload or an unknown symbol
//! moves on to the next source without retrying and without touching health.
//!
//! The adapter loop for one request is sequential. Independent requests may
//! run concurrently; health flags are shared hints, so two requests can both
//! try a failing source once before they converge.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::cache_key::CacheKey;
use crate::domain::error::{EtfDeskError, SourceError};
use crate::domain::ohlcv::PriceSeries;
use crate::domain::raw::EtfListing;
use crate::domain::validator::DataValidator;
use crate::ports::cache_port::{CachePayload, CacheStore};
use crate::ports::source_port::{SourcePort, SourceTier};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff: `retry_delay * attempt` after the 1-based `attempt` fails.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.retry_delay * attempt
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub retry: RetryPolicy,
    pub series_ttl: chrono::Duration,
    pub symbol_list_ttl: chrono::Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            retry: RetryPolicy::default(),
            series_ttl: chrono::Duration::hours(24),
            symbol_list_ttl: chrono::Duration::hours(72),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceState {
    pub name: String,
    pub tier: SourceTier,
    pub priority: usize,
    pub available: bool,
    pub last_error: Option<String>,
}

enum AttemptFailure {
    /// Every retry failed at the source.
    Exhausted(String),
    /// The source answered but the payload was rejected.
    Rejected(String),
    DeadlineExceeded,
}

/// What exhausting a source's retries does to its health.
#[derive(Clone, Copy)]
enum OnExhausted {
    MarkUnavailable,
    RecordOnly,
}

pub struct SourceOrchestrator {
    sources: Vec<Arc<dyn SourcePort>>,
    states: Mutex<Vec<SourceState>>,
    cache: Arc<dyn CacheStore>,
    validator: DataValidator,
    config: OrchestratorConfig,
}

impl SourceOrchestrator {
    /// Sources are ordered by tier; registration order breaks ties.
    pub fn new(
        mut sources: Vec<Arc<dyn SourcePort>>,
        cache: Arc<dyn CacheStore>,
        validator: DataValidator,
        config: OrchestratorConfig,
    ) -> Self {
        sources.sort_by_key(|s| s.tier());
        let states = sources
            .iter()
            .enumerate()
            .map(|(priority, s)| SourceState {
                name: s.name().to_string(),
                tier: s.tier(),
                priority,
                available: true,
                last_error: None,
            })
            .collect();
        SourceOrchestrator {
            sources,
            states: Mutex::new(states),
            cache,
            validator,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    fn states(&self) -> MutexGuard<'_, Vec<SourceState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn source_states(&self) -> Vec<SourceState> {
        self.states().clone()
    }

    pub fn fetch_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<PriceSeries, EtfDeskError> {
        self.fetch_series_with_deadline(symbol, start, end, None)
    }

    /// Like [`fetch_series`](Self::fetch_series), aborting with
    /// `DataUnavailable` once `deadline` passes. The deadline is checked before
    /// every attempt and before moving to the next source.
    pub fn fetch_series_with_deadline(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        deadline: Option<Instant>,
    ) -> Result<PriceSeries, EtfDeskError> {
        if start > end {
            return Err(EtfDeskError::validation(format!(
                "start date {start} is after end date {end}"
            )));
        }

        let key = CacheKey::series(symbol, start, end);
        if let Some(entry) = self.cache.get(&key) {
            match entry.payload {
                CachePayload::Series(series) => {
                    tracing::debug!(key = %key, "cache hit");
                    return Ok(series);
                }
                CachePayload::SymbolList(_) => {
                    tracing::warn!(key = %key, "cache entry has unexpected payload, refetching");
                }
            }
        } else {
            tracing::debug!(key = %key, "cache miss");
        }

        let request = format!("{symbol} {start}..{end}");
        let series = self.failover(
            &request,
            deadline,
            OnExhausted::MarkUnavailable,
            |source| {
                let raw = source.fetch_series(symbol, start, end)?;
                if raw.is_empty() {
                    return Err(SourceError::Empty);
                }
                Ok(raw)
            },
            |raw| {
                let validated = self.validator.validate(&raw)?;
                tracing::debug!(
                    symbol,
                    rows = validated.report.output_rows,
                    warnings = validated.report.warnings.len(),
                    "series validated"
                );
                Ok(validated.series)
            },
        )?;

        if let Err(e) = self.cache.put(
            &key,
            CachePayload::Series(series.clone()),
            self.config.series_ttl,
        ) {
            tracing::warn!(key = %key, error = %e, "failed to cache series");
        }
        Ok(series)
    }

    pub fn fetch_symbol_list(&self, market: &str) -> Result<Vec<EtfListing>, EtfDeskError> {
        let key = CacheKey::symbol_list(market);
        if let Some(entry) = self.cache.get(&key) {
            if let CachePayload::SymbolList(list) = entry.payload {
                tracing::debug!(key = %key, "cache hit");
                return Ok(list);
            }
            tracing::warn!(key = %key, "cache entry has unexpected payload, refetching");
        }

        let request = format!("symbol list {}", market.trim().to_uppercase());
        let list = self.failover(
            &request,
            None,
            OnExhausted::RecordOnly,
            |source| {
                let list = source.fetch_symbol_list(market)?;
                if list.is_empty() {
                    return Err(SourceError::Empty);
                }
                Ok(list)
            },
            Ok,
        )?;

        if let Err(e) = self.cache.put(
            &key,
            CachePayload::SymbolList(list.clone()),
            self.config.symbol_list_ttl,
        ) {
            tracing::warn!(key = %key, error = %e, "failed to cache symbol list");
        }
        Ok(list)
    }

    /// Close of the latest bar in `[as_of - window_days, as_of]`.
    pub fn latest_close(
        &self,
        symbol: &str,
        as_of: NaiveDate,
        window_days: i64,
    ) -> Result<f64, EtfDeskError> {
        let start = as_of - chrono::Duration::days(window_days);
        let series = self.fetch_series(symbol, start, as_of)?;
        series
            .latest_close()
            .ok_or_else(|| EtfDeskError::DataUnavailable {
                request: format!("{symbol} latest close as of {as_of}"),
                attempts: vec!["series contained no bars".to_string()],
            })
    }

    /// Explicit health test for one source. Success restores availability.
    pub fn probe(&self, name: &str) -> Result<bool, EtfDeskError> {
        let idx = self
            .sources
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| EtfDeskError::configuration(format!("unknown source '{name}'")))?;
        Ok(self.probe_index(idx))
    }

    pub fn probe_all(&self) -> Vec<SourceState> {
        for idx in 0..self.sources.len() {
            self.probe_index(idx);
        }
        self.source_states()
    }

    fn probe_index(&self, idx: usize) -> bool {
        let source = &self.sources[idx];
        let ok = source.test_connection();
        let mut states = self.states();
        let state = &mut states[idx];
        state.available = ok;
        if ok {
            tracing::info!(source = source.name(), "connection test passed, source available");
        } else {
            state.last_error = Some("connection test failed".to_string());
            tracing::warn!(source = source.name(), "connection test failed, source unavailable");
        }
        ok
    }

    fn failover<T, U>(
        &self,
        request: &str,
        deadline: Option<Instant>,
        on_exhausted: OnExhausted,
        fetch: impl Fn(&dyn SourcePort) -> Result<T, SourceError>,
        accept: impl Fn(T) -> Result<U, EtfDeskError>,
    ) -> Result<U, EtfDeskError> {
        let mut attempts = Vec::new();

        for (idx, source) in self.sources.iter().enumerate() {
            let name = source.name();
            let skipped = {
                let states = self.states();
                (!states[idx].available).then(|| states[idx].last_error.clone())
            };
            if let Some(last_error) = skipped {
                tracing::debug!(source = name, request, "skipping unavailable source");
                attempts.push(format!(
                    "{name}: unavailable ({})",
                    last_error.unwrap_or_else(|| "no error recorded".to_string())
                ));
                continue;
            }
            if deadline_passed(deadline) {
                attempts.push(format!("{name}: deadline exceeded"));
                break;
            }

            match self.attempt(source.as_ref(), request, deadline, &fetch, &accept) {
                Ok(value) => {
                    tracing::info!(source = name, request, "fetched");
                    return Ok(value);
                }
                Err(AttemptFailure::Exhausted(reason)) => {
                    let mark = matches!(on_exhausted, OnExhausted::MarkUnavailable);
                    if mark {
                        tracing::warn!(source = name, request, error = %reason, "retries exhausted, marking source unavailable");
                    } else {
                        tracing::warn!(source = name, request, error = %reason, "retries exhausted, trying next source");
                    }
                    self.record_failure(idx, &reason, mark);
                    attempts.push(format!("{name}: {reason}"));
                }
                Err(AttemptFailure::Rejected(reason)) => {
                    tracing::warn!(source = name, request, error = %reason, "payload rejected, trying next source");
                    self.record_failure(idx, &reason, false);
                    attempts.push(format!("{name}: {reason}"));
                }
                Err(AttemptFailure::DeadlineExceeded) => {
                    attempts.push(format!("{name}: deadline exceeded"));
                    break;
                }
            }
        }

        tracing::error!(request, "all sources exhausted");
        Err(EtfDeskError::DataUnavailable {
            request: request.to_string(),
            attempts,
        })
    }

    fn attempt<T, U>(
        &self,
        source: &dyn SourcePort,
        request: &str,
        deadline: Option<Instant>,
        fetch: &impl Fn(&dyn SourcePort) -> Result<T, SourceError>,
        accept: &impl Fn(T) -> Result<U, EtfDeskError>,
    ) -> Result<U, AttemptFailure> {
        let retry = &self.config.retry;
        let max = retry.max_retries.max(1);
        let mut last_error: Option<SourceError> = None;

        for attempt in 1..=max {
            if deadline_passed(deadline) {
                return Err(AttemptFailure::DeadlineExceeded);
            }
            tracing::debug!(source = source.name(), request, attempt, "fetch attempt");
            match fetch(source) {
                Ok(payload) => {
                    return accept(payload).map_err(|e| AttemptFailure::Rejected(e.to_string()));
                }
                Err(e @ SourceError::SymbolNotFound { .. }) => {
                    return Err(AttemptFailure::Rejected(e.to_string()));
                }
                Err(e) => {
                    tracing::warn!(source = source.name(), request, attempt, error = %e, "fetch attempt failed");
                    last_error = Some(e);
                    if attempt < max {
                        std::thread::sleep(retry.delay_for_attempt(attempt));
                    }
                }
            }
        }

        Err(AttemptFailure::Exhausted(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    fn record_failure(&self, idx: usize, reason: &str, mark_unavailable: bool) {
        let mut states = self.states();
        let state = &mut states[idx];
        state.last_error = Some(reason.to_string());
        if mark_unavailable {
            state.available = false;
        }
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_cache::MemoryCache;
    use crate::domain::raw::{RawSeries, RawValue};
    use crate::domain::validator::ValidatorConfig;
    use crate::ports::clock_port::Clock;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Epoch;

    impl Clock for Epoch {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp(1_700_000_000, 0).unwrap()
        }
    }

    struct Flaky {
        name: &'static str,
        tier: SourceTier,
        fail_first: usize,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(name: &'static str, tier: SourceTier, fail_first: usize) -> Self {
            Flaky {
                name,
                tier,
                fail_first,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SourcePort for Flaky {
        fn name(&self) -> &str {
            self.name
        }

        fn tier(&self) -> SourceTier {
            self.tier
        }

        fn fetch_series(&self, symbol: &str, start: NaiveDate, _end: NaiveDate) -> Result<RawSeries, SourceError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(SourceError::Network("connection reset".into()));
            }
            let mut raw = RawSeries::new(symbol, &["date", "open", "high", "low", "close", "volume"]);
            for i in 0..3 {
                raw.push_row(vec![
                    RawValue::from(start + chrono::Duration::days(i)),
                    RawValue::Number(10.0),
                    RawValue::Number(11.0),
                    RawValue::Number(9.0),
                    RawValue::Number(10.5),
                    RawValue::Number(100.0),
                ]);
            }
            Ok(raw)
        }

        fn fetch_symbol_list(&self, _market: &str) -> Result<Vec<EtfListing>, SourceError> {
            Err(SourceError::Other("no lists".into()))
        }

        fn test_connection(&self) -> bool {
            true
        }
    }

    fn orchestrator(sources: Vec<Arc<dyn SourcePort>>) -> SourceOrchestrator {
        SourceOrchestrator::new(
            sources,
            Arc::new(MemoryCache::new(Arc::new(Epoch))),
            DataValidator::new(ValidatorConfig {
                min_rows: 1,
                ..ValidatorConfig::default()
            }),
            OrchestratorConfig {
                retry: RetryPolicy {
                    max_retries: 3,
                    retry_delay: Duration::ZERO,
                },
                ..OrchestratorConfig::default()
            },
        )
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn linear_backoff() {
        let policy = RetryPolicy {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1500));
    }

    #[test]
    fn sources_sorted_by_tier() {
        let orch = orchestrator(vec![
            Arc::new(Flaky::new("synthetic", SourceTier::Synthetic, 0)),
            Arc::new(Flaky::new("primary", SourceTier::Primary, 0)),
        ]);
        let names: Vec<String> = orch.source_states().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["primary", "synthetic"]);
    }

    #[test]
    fn retry_within_budget_succeeds_without_failover() {
        let primary = Arc::new(Flaky::new("primary", SourceTier::Primary, 2));
        let orch = orchestrator(vec![primary.clone()]);
        let series = orch.fetch_series("SPY", d(2), d(10)).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 3);
        assert!(orch.source_states()[0].available);
    }

    #[test]
    fn probe_restores_availability() {
        let primary = Arc::new(Flaky::new("primary", SourceTier::Primary, usize::MAX));
        let orch = orchestrator(vec![primary]);
        assert!(orch.fetch_series("SPY", d(2), d(10)).is_err());
        assert!(!orch.source_states()[0].available);

        assert!(orch.probe("primary").unwrap());
        assert!(orch.source_states()[0].available);
        assert!(orch.probe("missing").is_err());
    }

    #[test]
    fn reversed_range_is_validation_error() {
        let orch = orchestrator(vec![Arc::new(Flaky::new("p", SourceTier::Primary, 0))]);
        let err = orch.fetch_series("SPY", d(10), d(2)).unwrap_err();
        assert!(matches!(err, EtfDeskError::Validation { .. }));
    }

    #[test]
    fn expired_deadline_aborts() {
        let primary = Arc::new(Flaky::new("primary", SourceTier::Primary, 0));
        let orch = orchestrator(vec![primary.clone()]);
        let err = orch
            .fetch_series_with_deadline("SPY", d(2), d(10), Some(Instant::now()))
            .unwrap_err();
        assert!(err.to_string().contains("deadline exceeded"));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }

    struct Unlisted;

    impl SourcePort for Unlisted {
        fn name(&self) -> &str {
            "unlisted"
        }

        fn tier(&self) -> SourceTier {
            SourceTier::Primary
        }

        fn fetch_series(&self, symbol: &str, _start: NaiveDate, _end: NaiveDate) -> Result<RawSeries, SourceError> {
            Err(SourceError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
        }

        fn fetch_symbol_list(&self, _market: &str) -> Result<Vec<EtfListing>, SourceError> {
            Ok(vec![])
        }

        fn test_connection(&self) -> bool {
            true
        }
    }

    #[test]
    fn unknown_symbol_skips_to_next_source_without_retry() {
        let fallback = Arc::new(Flaky::new("fallback", SourceTier::Synthetic, 0));
        let orch = orchestrator(vec![Arc::new(Unlisted), fallback.clone()]);
        orch.fetch_series("XYZ", d(2), d(10)).unwrap();
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);

        let states = orch.source_states();
        assert!(states[0].available);
        assert!(states[0].last_error.as_deref().unwrap().contains("XYZ"));
    }

    #[test]
    fn symbol_list_failures_exhaust_sources() {
        let orch = orchestrator(vec![Arc::new(Flaky::new("p", SourceTier::Primary, 0))]);
        let err = orch.fetch_symbol_list("US").unwrap_err();
        assert!(matches!(err, EtfDeskError::DataUnavailable { .. }));
        let state = &orch.source_states()[0];
        assert!(state.available);
        assert_eq!(state.last_error.as_deref(), Some("no lists"));
    }

    #[test]
    fn symbol_list_failure_leaves_series_path_open() {
        let primary = Arc::new(Flaky::new("primary", SourceTier::Primary, 0));
        let orch = orchestrator(vec![primary.clone()]);
        orch.fetch_series("SPY", d(2), d(10)).unwrap();
        assert!(orch.fetch_symbol_list("US").is_err());

        let series = orch.fetch_series("QQQ", d(2), d(10)).unwrap();
        assert_eq!(series.symbol(), "QQQ");
        assert!(orch.source_states()[0].available);
    }
}
