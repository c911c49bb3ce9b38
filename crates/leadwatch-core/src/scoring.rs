//! Provider-independent half of the scoring client.
//!
//! Builds the bounded prompt from a sanitized projection of an [`Item`],
//! and turns the model's free-text reply into a typed [`ScoreResult`].
//! The network call itself lives in the `leadwatch` crate.

use serde::Serialize;
use serde_json::Value;

use crate::error::LeadError;
use crate::models::{Item, Reach, ScoreResult, Urgency};

/// Score assigned whenever a real score is unavailable.
pub const NEUTRAL_SCORE: u8 = 50;

/// Default cap on body characters sent to the model.
pub const MAX_BODY_CHARS: usize = 2000;

/// Appended to bodies cut at [`MAX_BODY_CHARS`].
pub const TRUNCATION_MARKER: &str = "...[truncated]";

pub const DEFAULT_PRODUCT: &str =
    "an AI Interview Preparation SaaS product that helps people practice mock interviews with AI";

/// The subset of an item that is sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedItem {
    pub id: String,
    pub title: String,
    pub content: String,
    pub partition: String,
    pub author: String,
    pub engagement: i64,
    pub comment_count: i64,
}

/// Project an item down to what the prompt needs, hard-truncating the body.
pub fn sanitize(item: &Item, max_body_chars: usize) -> SanitizedItem {
    SanitizedItem {
        id: item.id.clone(),
        title: item.title.clone(),
        content: truncate_body(&item.body, max_body_chars),
        partition: item.partition.clone(),
        author: item.author.clone(),
        engagement: item.engagement,
        comment_count: item.comment_count,
    }
}

/// Cut `body` to at most `max_chars` characters, appending the truncation marker.
pub fn truncate_body(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &body[..byte_idx], TRUNCATION_MARKER),
        None => body.to_string(),
    }
}

/// Build the analysis prompt for one item.
pub fn build_prompt(product: &str, item: &SanitizedItem) -> String {
    let content = if item.content.trim().is_empty() {
        "No content, just title"
    } else {
        item.content.as_str()
    };

    format!(
        r#"You are an expert sales analyst for {product}.

Analyze this post and determine if the poster is a good lead to pitch the product to:

**Post Title:** {title}

**Post Content:** {content}

**Community:** r/{partition}

**Author:** u/{author}

**Engagement:** {engagement} upvotes, {comments} comments

Provide a JSON response with:
1. "score" (0-100): How good of a lead is this?
   - 90-100: Excellent lead (explicitly asking for help the product gives)
   - 70-89: Good lead (closely related, likely to be interested)
   - 50-69: Moderate lead (tangentially related)
   - 0-49: Poor lead (not relevant)

2. "reasoning" (1-2 sentences): Why this score?

3. "recommendation" (1-2 sentences): How should you pitch to this person?

4. "shouldReach" ("yes" | "maybe" | "no"): Should you reach out?

5. "painPoints" (array of strings): What specific pain points did they mention?

6. "urgency" ("high" | "medium" | "low"): How urgent is their need?

Respond ONLY with valid JSON, no other text."#,
        product = product,
        title = item.title,
        content = content,
        partition = item.partition,
        author = item.author,
        engagement = item.engagement,
        comments = item.comment_count,
    )
}

/// Strip markdown code fences that models like to wrap JSON in.
pub fn strip_code_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Parse the model's reply into a [`ScoreResult`].
///
/// Missing fields fall back to neutral values; only a reply that is not a
/// JSON object at all is an error.
pub fn parse_score_response(text: &str) -> Result<ScoreResult, LeadError> {
    let cleaned = strip_code_fences(text);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|e| LeadError::ScoringDegraded(format!("unparsable model reply: {}", e)))?;
    let obj = value
        .as_object()
        .ok_or_else(|| LeadError::ScoringDegraded("model reply is not a JSON object".into()))?;

    let score = obj
        .get("score")
        .and_then(score_from_value)
        .unwrap_or(NEUTRAL_SCORE);

    let text_field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let reach = match obj.get("shouldReach").and_then(Value::as_str) {
        Some(s) => Reach::parse_lenient(s),
        None => Reach::Maybe,
    };

    let urgency = obj
        .get("urgency")
        .and_then(Value::as_str)
        .map(Urgency::parse_lenient)
        .unwrap_or(Urgency::Medium);

    let pain_points = obj
        .get("painPoints")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(ScoreResult {
        score,
        reasoning: text_field("reasoning"),
        recommendation: text_field("recommendation"),
        reach,
        pain_points,
        urgency,
    })
}

fn score_from_value(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

/// Result returned when no scoring provider is configured.
pub fn neutral_disabled() -> ScoreResult {
    ScoreResult {
        score: NEUTRAL_SCORE,
        reasoning: "AI analysis disabled - configure a scoring provider API key".to_string(),
        recommendation: "Configure the scoring provider for AI-powered lead scoring".to_string(),
        reach: Reach::Unknown,
        pain_points: Vec::new(),
        urgency: Urgency::Medium,
    }
}

/// Result returned when a scoring call failed; the reason is kept for operators.
pub fn neutral_failure(reason: &str) -> ScoreResult {
    ScoreResult {
        score: NEUTRAL_SCORE,
        reasoning: format!("Analysis failed: {}", reason),
        recommendation: "Manual review recommended".to_string(),
        reach: Reach::Unknown,
        pain_points: Vec::new(),
        urgency: Urgency::Medium,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_with_body(body: &str) -> Item {
        Item {
            id: "x1".into(),
            title: "Any tips for a system design interview?".into(),
            body: body.into(),
            author: "candidate".into(),
            partition: "cscareerquestions".into(),
            engagement: 12,
            comment_count: 4,
            created_utc: 1_700_000_000,
            url: String::new(),
            permalink: String::new(),
        }
    }

    #[test]
    fn test_truncate_short_body_untouched() {
        assert_eq!(truncate_body("hello", 10), "hello");
        assert_eq!(truncate_body("", 10), "");
    }

    #[test]
    fn test_truncate_long_body_marked() {
        let body = "a".repeat(2500);
        let out = truncate_body(&body, MAX_BODY_CHARS);
        assert!(out.ends_with(TRUNCATION_MARKER));
        assert_eq!(out.chars().count(), MAX_BODY_CHARS + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(10);
        let out = truncate_body(&body, 3);
        assert_eq!(out, format!("ééé{}", TRUNCATION_MARKER));
    }

    #[test]
    fn test_prompt_mentions_item_fields() {
        let item = sanitize(&item_with_body(""), MAX_BODY_CHARS);
        let prompt = build_prompt(DEFAULT_PRODUCT, &item);
        assert!(prompt.contains("system design interview"));
        assert!(prompt.contains("No content, just title"));
        assert!(prompt.contains("r/cscareerquestions"));
        assert!(prompt.contains("12 upvotes, 4 comments"));
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn test_parse_full_response() {
        let reply = r#"```json
{"score": 88, "reasoning": "Explicitly asks for mock interviews", "recommendation": "Offer a free session",
 "shouldReach": "yes", "painPoints": ["anxiety", "no practice partner"], "urgency": "high"}
```"#;
        let result = parse_score_response(reply).unwrap();
        assert_eq!(result.score, 88);
        assert_eq!(result.reach, Reach::Yes);
        assert_eq!(result.urgency, Urgency::High);
        assert_eq!(result.pain_points, vec!["anxiety", "no practice partner"]);
    }

    #[test]
    fn test_parse_fills_missing_fields() {
        let result = parse_score_response("{}").unwrap();
        assert_eq!(result.score, NEUTRAL_SCORE);
        assert_eq!(result.reach, Reach::Maybe);
        assert_eq!(result.urgency, Urgency::Medium);
        assert!(result.pain_points.is_empty());
    }

    #[test]
    fn test_parse_clamps_and_coerces_score() {
        assert_eq!(parse_score_response(r#"{"score": 140}"#).unwrap().score, 100);
        assert_eq!(parse_score_response(r#"{"score": -3}"#).unwrap().score, 0);
        assert_eq!(parse_score_response(r#"{"score": "71"}"#).unwrap().score, 71);
        assert_eq!(parse_score_response(r#"{"score": 64.6}"#).unwrap().score, 65);
    }

    #[test]
    fn test_parse_garbage_is_degraded() {
        let err = parse_score_response("Sure! Here is my analysis").unwrap_err();
        assert!(matches!(err, LeadError::ScoringDegraded(_)));
        let err = parse_score_response("[1, 2]").unwrap_err();
        assert!(matches!(err, LeadError::ScoringDegraded(_)));
    }

    #[test]
    fn test_neutral_results() {
        let disabled = neutral_disabled();
        assert_eq!(disabled.score, 50);
        assert_eq!(disabled.reach, Reach::Unknown);
        assert_eq!(disabled.urgency, Urgency::Medium);

        let failed = neutral_failure("timeout");
        assert_eq!(failed.score, 50);
        assert!(failed.reasoning.contains("timeout"));
    }
}
