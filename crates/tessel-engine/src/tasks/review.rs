use std::collections::BTreeMap;

use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tessel_core::error::{Result, TesselError};
use tessel_core::types::AgentOutcome;

use crate::agent::{Agent, ModelStep};
use crate::state::WorkflowState;

/// Field holding the structured review verdict.
pub const REVIEW_RESULT: &str = "review_result";
/// Field holding the human-readable digest the writer consumes on revision.
pub const REVIEW_FEEDBACK: &str = "review_feedback";

/// A reviewer's structured verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub quality_score: f64,
    pub passed: bool,
    #[serde(default)]
    pub dimensions: BTreeMap<String, f64>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl ReviewVerdict {
    /// Human-readable digest consumed by the writer on a revision pass.
    pub fn digest(&self) -> String {
        let mut parts = vec![format!(
            "quality score {:.1} ({})",
            self.quality_score,
            if self.passed { "passed" } else { "needs revision" }
        )];
        if !self.issues.is_empty() {
            parts.push(format!("issues: {}", self.issues.join("; ")));
        }
        if !self.suggestions.is_empty() {
            parts.push(format!("improve: {}", self.suggestions.join("; ")));
        }
        parts.join(". ")
    }
}

/// Loosely-shaped model output accepted by the strict parse.
#[derive(Deserialize)]
struct RawReview {
    #[serde(alias = "score")]
    quality_score: Option<f64>,
    passed: Option<bool>,
    #[serde(default)]
    dimensions: BTreeMap<String, f64>,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

/// Parse a review from model output.
///
/// Policy: strict structured parse first; on failure fall back to a regex
/// score extraction, then a textual pass marker. Malformed model output
/// degrades, it never raises.
pub fn parse_review(text: &str, pass_threshold: f64) -> ReviewVerdict {
    let json_str = extract_json(text);

    if let Ok(raw) = serde_json::from_str::<RawReview>(json_str) {
        if let Some(score) = raw.quality_score {
            let score = score.clamp(0.0, 100.0);
            return ReviewVerdict {
                quality_score: score,
                passed: raw.passed.unwrap_or(score >= pass_threshold),
                dimensions: raw.dimensions,
                issues: raw.issues,
                suggestions: raw.suggestions,
            };
        }
    }

    warn!("Review output not structured, falling back to score extraction");

    // Best-effort: find a numeric "score: N" anywhere in the text.
    let score_re = Regex::new(r"(?i)(?:quality[_\s]?score|score)\s*[:：]?\s*([0-9]+(?:\.[0-9]+)?)");
    if let Some(caps) = score_re.ok().and_then(|re| re.captures(text)) {
        if let Ok(score) = caps[1].parse::<f64>() {
            let score = score.clamp(0.0, 100.0);
            return ReviewVerdict {
                quality_score: score,
                passed: score >= pass_threshold,
                dimensions: BTreeMap::new(),
                issues: Vec::new(),
                suggestions: Vec::new(),
            };
        }
    }

    // Last resort: an explicit textual pass marker.
    let passed = text.to_uppercase().contains("PASS");
    ReviewVerdict {
        quality_score: if passed { pass_threshold } else { 0.0 },
        passed,
        dimensions: BTreeMap::new(),
        issues: Vec::new(),
        suggestions: vec!["review output was unstructured; rerun for detail".to_string()],
    }
}

/// Extract JSON from a response that may contain markdown code fences.
pub(crate) fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

/// Generic quality reviewer: scores one subject field against the run's
/// context and reports the verdict plus a digest for the writer.
pub struct ReviewAgent {
    step: ModelStep,
    name: String,
    subject_field: String,
    context_fields: Vec<String>,
    pass_threshold: f64,
}

impl ReviewAgent {
    pub fn new(
        step: ModelStep,
        name: impl Into<String>,
        subject_field: impl Into<String>,
        context_fields: Vec<String>,
        pass_threshold: f64,
    ) -> Self {
        Self {
            step,
            name: name.into(),
            subject_field: subject_field.into(),
            context_fields,
            pass_threshold,
        }
    }
}

impl Agent for ReviewAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_field(&self) -> &str {
        REVIEW_RESULT
    }

    fn required_fields(&self) -> Vec<String> {
        vec![self.subject_field.clone()]
    }

    fn process(&self, state: &WorkflowState) -> BoxFuture<'_, Result<AgentOutcome>> {
        if !state.filled(&self.subject_field) {
            let err = TesselError::AgentInputMissing {
                agent: self.name.clone(),
                field: self.subject_field.clone(),
            };
            return Box::pin(async move { Err(err) });
        }

        let mut user = String::new();
        for field in &self.context_fields {
            if let Some(value) = state.field_str(field) {
                user.push_str(&format!("## {}\n{}\n\n", field, value));
            }
        }
        user.push_str(&format!(
            "## {} (under review)\n{}",
            self.subject_field,
            state.field_str(&self.subject_field).unwrap_or_default()
        ));

        Box::pin(async move {
            let text = match self.step.invoke(&self.name, &user).await {
                Ok(text) => text,
                Err(e) => return Ok(AgentOutcome::fail(e.to_string())),
            };

            let verdict = parse_review(&text, self.pass_threshold);
            let digest = verdict.digest();
            let content = serde_json::to_string(&verdict)?;

            Ok(AgentOutcome::ok(content)
                .with_meta("quality_score", serde_json::json!(verdict.quality_score))
                .with_meta(REVIEW_FEEDBACK, serde_json::json!(digest)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_parse() {
        let text = r#"{"quality_score": 86.5, "passed": true,
            "dimensions": {"coverage": 27.0, "completeness": 22.0},
            "issues": ["missing boundary case"], "suggestions": ["add negative test"]}"#;
        let verdict = parse_review(text, 80.0);
        assert_eq!(verdict.quality_score, 86.5);
        assert!(verdict.passed);
        assert_eq!(verdict.dimensions["coverage"], 27.0);
        assert_eq!(verdict.issues.len(), 1);
    }

    #[test]
    fn test_parse_code_fence() {
        let text = "Here is my review:\n```json\n{\"quality_score\": 72, \"passed\": false}\n```";
        let verdict = parse_review(text, 80.0);
        assert_eq!(verdict.quality_score, 72.0);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_parse_score_alias() {
        let verdict = parse_review(r#"{"score": 91}"#, 80.0);
        assert_eq!(verdict.quality_score, 91.0);
        // passed derived from the threshold when absent
        assert!(verdict.passed);
    }

    #[test]
    fn test_fallback_regex_score() {
        let verdict = parse_review("After careful review, the quality score: 65 out of 100.", 80.0);
        assert_eq!(verdict.quality_score, 65.0);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_fallback_pass_marker() {
        let verdict = parse_review("Overall the cases look solid. PASS.", 80.0);
        assert!(verdict.passed);
        assert_eq!(verdict.quality_score, 80.0);
    }

    #[test]
    fn test_garbage_never_raises() {
        let verdict = parse_review("I am not sure what to say about this.", 80.0);
        assert!(!verdict.passed);
        assert_eq!(verdict.quality_score, 0.0);
        assert!(!verdict.suggestions.is_empty());
    }

    #[test]
    fn test_score_clamped() {
        let verdict = parse_review(r#"{"quality_score": 250}"#, 80.0);
        assert_eq!(verdict.quality_score, 100.0);
    }

    #[test]
    fn test_digest_shape() {
        let verdict = ReviewVerdict {
            quality_score: 55.0,
            passed: false,
            dimensions: BTreeMap::new(),
            issues: vec!["no boundary tests".into(), "steps too vague".into()],
            suggestions: vec!["number the steps".into()],
        };
        let digest = verdict.digest();
        assert!(digest.contains("55.0"));
        assert!(digest.contains("needs revision"));
        assert!(digest.contains("no boundary tests; steps too vague"));
        assert!(digest.contains("improve: number the steps"));
    }
}
