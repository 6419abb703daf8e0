//! Prompt assembly and response extraction
//!
//! The adapter was tuned on a plain instruction format:
//!
//! ```text
//! Instruction: {prompt}
//! Response:
//! ```
//!
//! Optional request context is appended to the prompt as a `Resource:` line
//! before the instruction is formatted.

use serde_json::{Map, Value};

use crate::error::{CentinelaError, Result};

/// Marker separating the echoed instruction from the completion
pub const RESPONSE_MARKER: &str = "Response:";

/// Format a prompt as an instruction for the model
///
/// # Example
///
/// ```
/// use centinela::prompt::format_instruction;
///
/// assert_eq!(format_instruction("hi"), "Instruction: hi\nResponse:");
/// ```
#[must_use]
pub fn format_instruction(prompt: &str) -> String {
    format!("Instruction: {prompt}\n{RESPONSE_MARKER}")
}

/// Extract the completion from decoded model output
///
/// Returns the text after the first [`RESPONSE_MARKER`], trimmed. Output
/// without the marker is returned unchanged.
///
/// # Example
///
/// ```
/// use centinela::prompt::extract_response;
///
/// assert_eq!(extract_response("Instruction: x\nResponse: 4 "), "4");
/// assert_eq!(extract_response(" no marker "), " no marker ");
/// ```
#[must_use]
pub fn extract_response(decoded: &str) -> &str {
    match decoded.split_once(RESPONSE_MARKER) {
        Some((_, completion)) => completion.trim(),
        None => decoded,
    }
}

/// Build the effective prompt from the request prompt and optional context
///
/// A non-empty `resource` object is rendered as compact JSON on a trailing
/// `Resource:` line. An absent or empty object leaves the prompt unchanged.
///
/// # Errors
///
/// Returns error if the resource cannot be rendered as JSON.
pub fn compose(prompt: &str, resource: Option<&Map<String, Value>>) -> Result<String> {
    match resource {
        Some(resource) if !resource.is_empty() => {
            let rendered = serde_json::to_string(resource).map_err(|e| {
                CentinelaError::ServerError(format!("Failed to render resource: {e}"))
            })?;
            Ok(format!("{prompt}\nResource: {rendered}"))
        },
        _ => Ok(prompt.to_string()),
    }
}
