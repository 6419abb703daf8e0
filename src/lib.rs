//! # Centinela
//!
//! Guardrail-scoped text generation over HTTP.
//!
//! Centinela loads a small causal language model, optionally folds a LoRA
//! adapter into its weights, and answers `POST /inference` with the model's
//! completion plus an `in_scope` flag derived from refusal phrases in the
//! output.
//!
//! ## Request path
//!
//! 1. [`prompt::compose`] appends an optional resource to the user prompt
//! 2. [`generate::TextGenerator::generate`] wraps it as
//!    `"Instruction: {prompt}\nResponse:"`, runs the model and keeps the text
//!    after `"Response:"`
//! 3. [`guard::is_in_scope`] flags refusals
//!
//! ## Example
//!
//! ```rust
//! use centinela::{guard, prompt};
//!
//! let decoded = "Instruction: What is 2+2?\nResponse: 4";
//! let result = prompt::extract_response(decoded);
//! assert_eq!(result, "4");
//! assert!(guard::is_in_scope(result));
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
// Clippy allows (MUST come after deny/warn to override them)
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)] // usize -> f64 precision loss is acceptable for metrics
#![allow(clippy::cast_possible_truncation)] // u128 -> u64 for durations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::float_cmp)] // Allow float comparisons in tests

/// HTTP API: `/inference`, `/health`, `/metrics`
pub mod api;
/// Server bootstrap (extracted from main.rs for testability)
pub mod cli;
pub mod config;
pub mod error;
pub mod generate;
/// Out-of-scope keyword heuristic
pub mod guard;
pub mod metrics;
/// Base model loading, LoRA merge and the candle generation loop
pub mod model;
pub mod prompt;

// Re-exports for convenience
pub use error::{CentinelaError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
