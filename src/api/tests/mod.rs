//! API Tests
//!
//! Part organization:
//! - inference: `/inference` happy paths, prompt composition, scope flag
//! - errors: validation and generation failures
//! - limits: concurrency bound and timeout
//! - health_metrics: `/health` and `/metrics`

mod errors;
