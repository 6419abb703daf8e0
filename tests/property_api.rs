//! Property-based tests for the request path
//!
//! Prompt composition, response extraction and the scope flag, checked over
//! generated inputs rather than hand-picked strings.

use centinela::api::{InferenceRequest, InferenceResponse};
use centinela::generate::{GenerationConfig, SamplingMode};
use centinela::guard::{is_in_scope, REFUSAL_KEYWORDS};
use centinela::prompt::{compose, extract_response, format_instruction, RESPONSE_MARKER};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn resource_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-z_]{1,8}", any::<i64>(), 1..5).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect()
    })
}

// ============================================================================
// Prompt composition
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_no_resource_leaves_prompt_unchanged(prompt in ".{0,200}") {
        prop_assert_eq!(compose(&prompt, None).unwrap(), prompt.clone());
        prop_assert_eq!(compose(&prompt, Some(&Map::new())).unwrap(), prompt);
    }

    #[test]
    fn prop_resource_is_appended(prompt in "[^\n]{1,80}", resource in resource_strategy()) {
        let composed = compose(&prompt, Some(&resource)).unwrap();
        let (head, tail) = composed.split_once("\nResource: ").unwrap();
        prop_assert_eq!(head, prompt.as_str());

        let parsed: Map<String, Value> = serde_json::from_str(tail).unwrap();
        prop_assert_eq!(parsed, resource);
    }

    #[test]
    fn prop_instruction_wraps_prompt(prompt in ".{0,200}") {
        let instruction = format_instruction(&prompt);
        let expected_prefix = format!("Instruction: {prompt}\n");
        prop_assert!(instruction.starts_with(&expected_prefix));
        prop_assert!(instruction.ends_with(RESPONSE_MARKER));
    }
}

// ============================================================================
// Response extraction
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_extracts_text_after_first_marker(
        prompt in "[^R]{0,60}",
        answer in "[a-zA-Z0-9 .,!?]{0,60}",
    ) {
        let decoded = format!("{}{answer}", format_instruction(&prompt));
        prop_assert_eq!(extract_response(&decoded), answer.trim());
    }

    #[test]
    fn prop_only_first_marker_splits(answer in "[a-z ]{0,30}") {
        let decoded = format!("Instruction: q\nResponse: {answer} Response: again");
        let expected = format!("{answer} Response: again");
        prop_assert_eq!(extract_response(&decoded), expected.trim());
    }

    #[test]
    fn prop_no_marker_returns_input(decoded in "[^:]{0,120}") {
        prop_assert_eq!(extract_response(&decoded), decoded.as_str());
    }
}

// ============================================================================
// Scope heuristic
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_refusal_phrase_anywhere_is_out_of_scope(
        prefix in "[a-z ]{0,40}",
        suffix in "[a-z ]{0,40}",
        index in 0..REFUSAL_KEYWORDS.len(),
        upper in any::<bool>(),
    ) {
        let keyword = if upper {
            REFUSAL_KEYWORDS[index].to_uppercase()
        } else {
            REFUSAL_KEYWORDS[index].to_string()
        };
        let text = format!("{prefix}{keyword}{suffix}");
        prop_assert!(!is_in_scope(&text));
    }

    #[test]
    fn prop_digits_are_in_scope(text in "[0-9 +=]{0,80}") {
        prop_assert!(is_in_scope(&text));
    }
}

// ============================================================================
// Generation parameters
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_positive_temperature_samples(temperature in 0.001f64..5.0) {
        let config = GenerationConfig::default().with_temperature(temperature);
        prop_assert_eq!(config.sampling(), SamplingMode::Sample { temperature });
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn prop_request_fields_survive_json(
        prompt in "[a-zA-Z0-9 ?]{1,40}",
        max_new_tokens in 1usize..2048,
        temperature in 0.0f64..2.0,
    ) {
        let body = serde_json::json!({
            "prompt": prompt,
            "max_new_tokens": max_new_tokens,
            "temperature": temperature,
        });
        let request: InferenceRequest = serde_json::from_value(body).unwrap();
        prop_assert_eq!(request.prompt, prompt);
        prop_assert_eq!(request.max_new_tokens, max_new_tokens);
        prop_assert_eq!(request.temperature, temperature);
        prop_assert!(request.resource.is_none());
    }
}

#[test]
fn test_zero_temperature_is_greedy() {
    let config = GenerationConfig::default().with_temperature(0.0);
    assert_eq!(config.sampling(), SamplingMode::Greedy);
}

#[test]
fn test_response_serialization() {
    let response = InferenceResponse {
        result: "This request appears out of scope".to_string(),
        in_scope: false,
    };
    let json = serde_json::to_string(&response).unwrap();
    assert_eq!(
        json,
        r#"{"result":"This request appears out of scope","in_scope":false}"#
    );
}
