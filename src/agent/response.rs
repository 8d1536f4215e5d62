//! Parsing of model replies into classifications and answer lists.
//!
//! Models wrap JSON in code fences, prepend prose, and drift between
//! shapes. Everything here is tolerant: find the JSON, accept the known
//! shapes, reject anything else as [`LlmError::Malformed`].

use crate::agent::annotator::Taxonomy;
use crate::error::LlmError;
use crate::models::{Classification, Question, TheoryEvidence, UNKNOWN_ANSWER};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Locate and parse the JSON payload of a model reply.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(inner) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str(inner.trim()) {
            return Some(value);
        }
    }

    // Outermost bracketed span, trying whichever opener comes first.
    let mut spans: Vec<(usize, char)> = ['{', '[']
        .iter()
        .filter_map(|&open| trimmed.find(open).map(|i| (i, open)))
        .collect();
    spans.sort();
    for (start, open) in spans {
        let close = if open == '{' { '}' } else { ']' };
        if let Some(end) = trimmed.rfind(close) {
            if end > start {
                if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                    return Some(value);
                }
            }
        }
    }

    None
}

fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let rest = &text[start + 3..];
    // Skip an info string such as `json`.
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// Parse a classifier reply.
///
/// Accepts `{"aging_related": bool, "theories": [...]}` and the older
/// `{"theory_tags": [...]}`. Theory entries may be strings or objects
/// carrying `theory_name` / `name`, optionally with `confidence` and
/// `evidence_snippets`. Names not in the taxonomy are dropped.
pub fn parse_classification(text: &str, taxonomy: &Taxonomy) -> Result<Classification, LlmError> {
    let value = extract_json(text)
        .ok_or_else(|| LlmError::Malformed("no JSON object in classifier reply".to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| LlmError::Malformed("classifier reply is not an object".to_string()))?;

    let entries = object
        .get("theories")
        .or_else(|| object.get("theory_tags"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut theories = BTreeSet::new();
    let mut evidence = BTreeMap::new();
    for entry in &entries {
        let Some(raw) = theory_entry_name(entry) else {
            continue;
        };
        match taxonomy.resolve(raw) {
            Some(name) => {
                theories.insert(name.to_string());
                if let Some(found) = theory_entry_evidence(entry) {
                    evidence.insert(name.to_string(), found);
                }
            }
            None => warn!("Discarding theory outside the taxonomy: {:?}", raw),
        }
    }

    let aging_related = match object.get("aging_related").or_else(|| object.get("is_aging_related")) {
        Some(flag) => truthy(flag).ok_or_else(|| {
            LlmError::Malformed(format!("aging_related is not a boolean: {}", flag))
        })?,
        None if object.contains_key("theory_tags") || object.contains_key("theories") => {
            !theories.is_empty()
        }
        None => {
            return Err(LlmError::Malformed(
                "classifier reply has neither aging_related nor theories".to_string(),
            ))
        }
    };

    if !aging_related {
        return Ok(Classification::unrelated());
    }

    let mut classification = Classification::related(theories);
    classification.evidence = evidence;
    Ok(classification)
}

fn theory_entry_name(entry: &Value) -> Option<&str> {
    match entry {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map
            .get("theory_name")
            .or_else(|| map.get("name"))
            .and_then(Value::as_str),
        _ => None,
    }
}

fn theory_entry_evidence(entry: &Value) -> Option<TheoryEvidence> {
    let map = entry.as_object()?;

    let confidence = map.get("confidence").and_then(|c| match c {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    let snippets = match map.get("evidence_snippets").or_else(|| map.get("evidence")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    };

    if confidence.is_none() && snippets.is_empty() {
        return None;
    }
    Some(TheoryEvidence {
        confidence,
        snippets,
    })
}

fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parse an extractor reply into exactly one answer per question.
///
/// Accepts an object keyed by question id, an object with an `answers`
/// array, or a bare array. Missing answers become the unknown marker;
/// constrained answers are mapped onto the question's choices.
pub fn parse_answers(text: &str, questions: &[Question]) -> Result<Vec<String>, LlmError> {
    let value = extract_json(text)
        .ok_or_else(|| LlmError::Malformed("no JSON in extractor reply".to_string()))?;

    let raw: Vec<Option<String>> = match &value {
        Value::Array(items) => items.iter().map(answer_text).collect(),
        Value::Object(map) => match map.get("answers") {
            Some(Value::Array(items)) => items.iter().map(answer_text).collect(),
            Some(Value::Object(keyed)) => keyed_answers(keyed, questions),
            _ => keyed_answers(map, questions),
        },
        _ => {
            return Err(LlmError::Malformed(
                "extractor reply is neither an object nor an array".to_string(),
            ))
        }
    };

    if raw.iter().all(Option::is_none) {
        return Err(LlmError::Malformed("extractor reply has no answers".to_string()));
    }

    Ok(questions
        .iter()
        .enumerate()
        .map(|(i, q)| match raw.get(i).cloned().flatten() {
            Some(answer) => q.canonical_answer(&answer),
            None => UNKNOWN_ANSWER.to_string(),
        })
        .collect())
}

fn keyed_answers(map: &serde_json::Map<String, Value>, questions: &[Question]) -> Vec<Option<String>> {
    questions
        .iter()
        .map(|q| {
            map.iter()
                .find(|(key, _)| key.trim().eq_ignore_ascii_case(&q.id))
                .and_then(|(_, v)| answer_text(v))
        })
        .collect()
}

fn answer_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(true) => Some("Yes".to_string()),
        Value::Bool(false) => Some("No".to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(answer_text).collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Value::Object(map) => map.get("answer").and_then(answer_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn taxonomy() -> Taxonomy {
        Taxonomy::new(&[
            "Free Radical Theory".to_string(),
            "Telomere Theory".to_string(),
            "Mitochondrial Theory".to_string(),
        ])
    }

    fn questions() -> Vec<Question> {
        Config::default().questions
    }

    #[test]
    fn test_extract_json_plain_fenced_and_prose() {
        assert_eq!(extract_json(r#"{"a": 1}"#).unwrap()["a"], 1);
        assert_eq!(extract_json("```json\n{\"a\": 2}\n```").unwrap()["a"], 2);
        assert_eq!(
            extract_json("Sure! Here is the result: {\"a\": 3} Hope it helps.").unwrap()["a"],
            3
        );
        assert!(extract_json("[1, 2]").unwrap().is_array());
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("   ").is_none());
    }

    #[test]
    fn test_classification_standard_shape() {
        let reply = r#"{"aging_related": true, "theories": ["free radical theory", "Telomere Theory"]}"#;
        let c = parse_classification(reply, &taxonomy()).unwrap();
        assert!(c.aging_related);
        assert_eq!(
            c.theories.into_iter().collect::<Vec<_>>(),
            vec!["Free Radical Theory", "Telomere Theory"]
        );
    }

    #[test]
    fn test_classification_object_entries_and_unknown_names() {
        let reply = r#"Result:
```json
{"aging_related": "yes", "theories": [{"theory_name": "Mitochondrial Theory"}, {"name": "Hyperfunction Theory"}]}
```"#;
        let c = parse_classification(reply, &taxonomy()).unwrap();
        assert_eq!(c, Classification::related(["Mitochondrial Theory"]));
    }

    #[test]
    fn test_classification_keeps_evidence() {
        let reply = r#"{"theory_tags": [
            {"theory_name": "Telomere Theory", "confidence": 0.9,
             "evidence_snippets": ["telomeres shorten with each division", "  "]},
            {"theory_name": "free radical theory", "confidence": "0.4", "evidence": "ROS accumulate"},
            {"name": "Mitochondrial Theory"}
        ]}"#;
        let c = parse_classification(reply, &taxonomy()).unwrap();
        assert_eq!(c.theories.len(), 3);

        let telomere = &c.evidence["Telomere Theory"];
        assert_eq!(telomere.confidence, Some(0.9));
        assert_eq!(telomere.snippets, vec!["telomeres shorten with each division"]);

        let radical = &c.evidence["Free Radical Theory"];
        assert_eq!(radical.confidence, Some(0.4));
        assert_eq!(radical.snippets, vec!["ROS accumulate"]);

        assert!(!c.evidence.contains_key("Mitochondrial Theory"));
    }

    #[test]
    fn test_classification_legacy_theory_tags() {
        let c = parse_classification(r#"{"theory_tags": ["Telomere Theory"]}"#, &taxonomy()).unwrap();
        assert!(c.passes());

        let c = parse_classification(r#"{"theory_tags": []}"#, &taxonomy()).unwrap();
        assert!(!c.aging_related);
    }

    #[test]
    fn test_classification_unrelated_clears_theories() {
        let reply = r#"{"aging_related": false, "theories": ["Telomere Theory"]}"#;
        assert_eq!(
            parse_classification(reply, &taxonomy()).unwrap(),
            Classification::unrelated()
        );
    }

    #[test]
    fn test_classification_malformed() {
        assert!(matches!(
            parse_classification("I cannot help with that.", &taxonomy()),
            Err(LlmError::Malformed(_))
        ));
        assert!(parse_classification(r#"{"verdict": "maybe"}"#, &taxonomy()).is_err());
        assert!(parse_classification(r#"{"aging_related": 3}"#, &taxonomy()).is_err());
    }

    #[test]
    fn test_answers_keyed_object() {
        let reply = r#"{"Q1": "mechanism", "q2": true, "Q3": "no", "Q9": "maybe"}"#;
        let answers = parse_answers(reply, &questions()).unwrap();
        assert_eq!(answers.len(), 9);
        assert_eq!(answers[1], "Yes");
        assert_eq!(answers[2], "No");
        assert_eq!(answers[3], UNKNOWN_ANSWER);
        assert_eq!(answers[8], UNKNOWN_ANSWER);
    }

    #[test]
    fn test_answers_array_shapes_are_padded() {
        let qs = questions();
        let from_bare = parse_answers(r#"["Yes", "Yes"]"#, &qs).unwrap();
        let from_field = parse_answers(r#"{"answers": ["Yes", "Yes"]}"#, &qs).unwrap();
        assert_eq!(from_bare, from_field);
        assert_eq!(from_bare.len(), 9);
        assert!(from_bare[2..].iter().all(|a| a == UNKNOWN_ANSWER));
    }

    #[test]
    fn test_answers_extra_entries_are_dropped() {
        let reply = serde_json::to_string(&vec!["No"; 12]).unwrap();
        assert_eq!(parse_answers(&reply, &questions()).unwrap().len(), 9);
    }

    #[test]
    fn test_answers_object_entries() {
        let reply = r#"{"answers": [{"id": "Q1", "answer": "No"}, null, {"answer": "yes"}]}"#;
        let answers = parse_answers(reply, &questions()).unwrap();
        assert_eq!(answers[1], UNKNOWN_ANSWER);
        assert_eq!(answers[2], "Yes");
    }

    #[test]
    fn test_answers_malformed() {
        assert!(parse_answers("The paper does not say.", &questions()).is_err());
        assert!(parse_answers(r#"{"summary": "none"}"#, &questions()).is_err());
        assert!(parse_answers("42", &questions()).is_err());
    }
}
