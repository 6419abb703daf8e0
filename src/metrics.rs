//! Request metrics for the inference endpoint
//!
//! Tracks request outcomes, out-of-scope verdicts and cumulative generation
//! time with lock-free counters, and renders them in Prometheus text format
//! for `GET /metrics`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Central metrics collector shared by all handlers
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    /// Total number of inference requests that reached the handler
    total_requests: Arc<AtomicUsize>,
    /// Requests that produced a result
    successful_requests: Arc<AtomicUsize>,
    /// Requests that failed validation or generation
    failed_requests: Arc<AtomicUsize>,
    /// Successful requests flagged as out of scope
    out_of_scope_responses: Arc<AtomicUsize>,
    /// Characters of returned completions
    total_output_chars: Arc<AtomicUsize>,
    /// Total generation time in microseconds
    total_inference_time_us: Arc<AtomicU64>,
    /// Start time for rate calculations
    start_time: Instant,
}

impl MetricsCollector {
    /// Create a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_requests: Arc::new(AtomicUsize::new(0)),
            successful_requests: Arc::new(AtomicUsize::new(0)),
            failed_requests: Arc::new(AtomicUsize::new(0)),
            out_of_scope_responses: Arc::new(AtomicUsize::new(0)),
            total_output_chars: Arc::new(AtomicUsize::new(0)),
            total_inference_time_us: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Record a completed inference
    pub fn record_success(&self, output_chars: usize, in_scope: bool, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.successful_requests.fetch_add(1, Ordering::Relaxed);
        if !in_scope {
            self.out_of_scope_responses.fetch_add(1, Ordering::Relaxed);
        }
        self.total_output_chars
            .fetch_add(output_chars, Ordering::Relaxed);
        self.total_inference_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of metrics
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let successful = self.successful_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let out_of_scope = self.out_of_scope_responses.load(Ordering::Relaxed);
        let total_output_chars = self.total_output_chars.load(Ordering::Relaxed);
        let total_time_us = self.total_inference_time_us.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed();

        MetricsSnapshot {
            total_requests,
            successful_requests: successful,
            failed_requests: failed,
            out_of_scope_responses: out_of_scope,
            total_output_chars,
            total_inference_time_us: total_time_us,
            uptime_secs: uptime.as_secs(),
            avg_latency_ms: if successful > 0 {
                (total_time_us as f64 / 1000.0) / successful as f64
            } else {
                0.0
            },
            error_rate: if total_requests > 0 {
                failed as f64 / total_requests as f64
            } else {
                0.0
            },
            out_of_scope_rate: if successful > 0 {
                out_of_scope as f64 / successful as f64
            } else {
                0.0
            },
        }
    }

    /// Export metrics in Prometheus format
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "# HELP centinela_requests_total Total number of inference requests\n\
             # TYPE centinela_requests_total counter\n\
             centinela_requests_total {}\n\
             # HELP centinela_requests_successful Successful inference requests\n\
             # TYPE centinela_requests_successful counter\n\
             centinela_requests_successful {}\n\
             # HELP centinela_requests_failed Failed inference requests\n\
             # TYPE centinela_requests_failed counter\n\
             centinela_requests_failed {}\n\
             # HELP centinela_out_of_scope_total Responses flagged out of scope\n\
             # TYPE centinela_out_of_scope_total counter\n\
             centinela_out_of_scope_total {}\n\
             # HELP centinela_output_chars_total Characters of returned completions\n\
             # TYPE centinela_output_chars_total counter\n\
             centinela_output_chars_total {}\n\
             # HELP centinela_inference_time_seconds Total generation time\n\
             # TYPE centinela_inference_time_seconds counter\n\
             centinela_inference_time_seconds {:.6}\n\
             # HELP centinela_avg_latency_ms Average generation latency in milliseconds\n\
             # TYPE centinela_avg_latency_ms gauge\n\
             centinela_avg_latency_ms {:.2}\n\
             # HELP centinela_error_rate Error rate (0.0-1.0)\n\
             # TYPE centinela_error_rate gauge\n\
             centinela_error_rate {:.4}\n\
             # HELP centinela_out_of_scope_rate Share of results flagged out of scope (0.0-1.0)\n\
             # TYPE centinela_out_of_scope_rate gauge\n\
             centinela_out_of_scope_rate {:.4}\n\
             # HELP centinela_uptime_seconds Uptime in seconds\n\
             # TYPE centinela_uptime_seconds counter\n\
             centinela_uptime_seconds {}\n",
            snapshot.total_requests,
            snapshot.successful_requests,
            snapshot.failed_requests,
            snapshot.out_of_scope_responses,
            snapshot.total_output_chars,
            snapshot.total_inference_time_us as f64 / 1_000_000.0,
            snapshot.avg_latency_ms,
            snapshot.error_rate,
            snapshot.out_of_scope_rate,
            snapshot.uptime_secs
        )
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total number of requests processed
    pub total_requests: usize,
    /// Number of successful requests
    pub successful_requests: usize,
    /// Number of failed requests
    pub failed_requests: usize,
    /// Successful requests flagged out of scope
    pub out_of_scope_responses: usize,
    /// Characters of returned completions
    pub total_output_chars: usize,
    /// Total generation time in microseconds
    pub total_inference_time_us: u64,
    /// System uptime in seconds
    pub uptime_secs: u64,
    /// Average request latency in milliseconds
    pub avg_latency_ms: f64,
    /// Error rate as a fraction (0.0 to 1.0)
    pub error_rate: f64,
    /// Out-of-scope share of successful requests (0.0 to 1.0)
    pub out_of_scope_rate: f64,
}
