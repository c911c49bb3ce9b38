//! Core data models used throughout Leadwatch.
//!
//! An [`Item`] is what the source provider hands us. Once scored it gains an
//! [`AnalysisResult`], and the stored row as a whole is a [`Lead`] carrying
//! the operator-facing workflow status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LeadError;

/// A single ingested content record, normalized from the source provider.
///
/// Immutable once stored: `id` is the natural key and re-ingesting the same
/// id is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub title: String,
    /// Body text; empty when the item is title-only.
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    /// Source partition (sub-forum) the item was posted in.
    #[serde(default)]
    pub partition: String,
    /// Upstream engagement score (votes).
    #[serde(default)]
    pub engagement: i64,
    #[serde(default)]
    pub comment_count: i64,
    /// Creation time, epoch seconds.
    #[serde(default)]
    pub created_utc: i64,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub permalink: String,
}

/// Should the operator reach out to this lead?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reach {
    Yes,
    Maybe,
    No,
    Unknown,
}

impl Reach {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reach::Yes => "yes",
            Reach::Maybe => "maybe",
            Reach::No => "no",
            Reach::Unknown => "unknown",
        }
    }

    /// Parse a model-supplied value, mapping anything unrecognized to `Unknown`.
    pub fn parse_lenient(s: &str) -> Reach {
        s.parse().unwrap_or(Reach::Unknown)
    }
}

impl FromStr for Reach {
    type Err = LeadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(Reach::Yes),
            "maybe" => Ok(Reach::Maybe),
            "no" => Ok(Reach::No),
            "unknown" => Ok(Reach::Unknown),
            other => Err(LeadError::invalid(format!("unknown reach value: '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Medium,
    Low,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::High => "high",
            Urgency::Medium => "medium",
            Urgency::Low => "low",
        }
    }

    pub fn parse_lenient(s: &str) -> Urgency {
        s.parse().unwrap_or(Urgency::Medium)
    }
}

impl FromStr for Urgency {
    type Err = LeadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Urgency::High),
            "medium" => Ok(Urgency::Medium),
            "low" => Ok(Urgency::Low),
            other => Err(LeadError::invalid(format!(
                "unknown urgency value: '{}'",
                other
            ))),
        }
    }
}

/// Operator workflow status of a lead.
///
/// Transitions are unconstrained: any status may follow any other.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Interested,
    NotInterested,
    Converted,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 5] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Interested,
        LeadStatus::NotInterested,
        LeadStatus::Converted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Interested => "interested",
            LeadStatus::NotInterested => "not_interested",
            LeadStatus::Converted => "converted",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = LeadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = LeadStatus::ALL.iter().map(|s| s.as_str()).collect();
                LeadError::invalid(format!(
                    "invalid status '{}': must be one of {}",
                    s,
                    valid.join(", ")
                ))
            })
    }
}

/// Output of one scoring call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    /// Relevance score, 0..=100.
    pub score: u8,
    pub reasoning: String,
    pub recommendation: String,
    pub reach: Reach,
    pub pain_points: Vec<String>,
    pub urgency: Urgency,
}

impl ScoreResult {
    /// Stamp this result with the time the analysis completed.
    pub fn analyzed_at(self, analyzed_at: i64) -> AnalysisResult {
        AnalysisResult {
            score: self.score,
            reasoning: self.reasoning,
            recommendation: self.recommendation,
            reach: self.reach,
            pain_points: self.pain_points,
            urgency: self.urgency,
            analyzed_at,
        }
    }
}

/// Persisted analysis of an item. Re-analysis overwrites it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub score: u8,
    pub reasoning: String,
    pub recommendation: String,
    pub reach: Reach,
    pub pain_points: Vec<String>,
    pub urgency: Urgency,
    /// Epoch seconds.
    pub analyzed_at: i64,
}

/// A stored item plus its analysis and workflow fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    #[serde(flatten)]
    pub item: Item,
    /// Keyword whose search first surfaced this item.
    pub source_keyword: Option<String>,
    pub analysis: Option<AnalysisResult>,
    pub status: LeadStatus,
    pub notes: Option<String>,
    /// Set on the first transition into `contacted`, never cleared.
    pub contacted_at: Option<i64>,
    pub ingested_at: i64,
    pub updated_at: i64,
}

impl Lead {
    pub fn is_analyzed(&self) -> bool {
        self.analysis.is_some()
    }

    pub fn score(&self) -> Option<u8> {
        self.analysis.as_ref().map(|a| a.score)
    }
}

/// The qualifying-lead push event (`NEW_LEAD`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadEvent {
    #[serde(flatten)]
    pub item: Item,
    pub analysis: AnalysisResult,
}

impl LeadEvent {
    pub const KIND: &'static str = "NEW_LEAD";
}

/// Filters for [`LeadStore::query`](crate::store::LeadStore::query).
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<LeadStatus>,
    pub source_keyword: Option<String>,
    pub partition: Option<String>,
    pub min_score: Option<u8>,
    /// Only analyzed rows, ordered by score then creation time (both descending).
    /// Otherwise rows are ordered by creation time descending.
    pub analyzed_only: bool,
    pub limit: Option<usize>,
}

/// Filters for bulk deletion. At least one must be set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteFilter {
    /// Matches analyzed rows with score >= this value.
    pub min_score: Option<u8>,
    /// Matches rows whose item creation time is older than this many days.
    pub max_age_days: Option<u32>,
    pub status: Option<LeadStatus>,
}

impl DeleteFilter {
    pub fn is_empty(&self) -> bool {
        self.min_score.is_none() && self.max_age_days.is_none() && self.status.is_none()
    }

    /// Reject the empty filter set, which would otherwise wipe the table.
    pub fn validate(&self) -> crate::Result<()> {
        if self.is_empty() {
            return Err(LeadError::invalid(
                "at least one of minScore, maxAgeDays, status is required",
            ));
        }
        Ok(())
    }

    /// Creation-time cutoff in epoch seconds for the age filter.
    pub fn age_cutoff(&self, now: i64) -> Option<i64> {
        self.max_age_days
            .map(|days| now - i64::from(days) * 86_400)
    }
}

/// Aggregate counts over the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: u64,
    pub analyzed: u64,
    pub pending: u64,
    /// Mean score over analyzed rows; `None` when nothing is analyzed.
    pub average_score: Option<f64>,
}

/// Analyzed rows per workflow status.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusBreakdown {
    pub new: u64,
    pub contacted: u64,
    pub interested: u64,
    pub not_interested: u64,
    pub converted: u64,
}

impl StatusBreakdown {
    pub fn add(&mut self, status: LeadStatus, count: u64) {
        match status {
            LeadStatus::New => self.new += count,
            LeadStatus::Contacted => self.contacted += count,
            LeadStatus::Interested => self.interested += count,
            LeadStatus::NotInterested => self.not_interested += count,
            LeadStatus::Converted => self.converted += count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_strings() {
        for status in LeadStatus::ALL {
            assert_eq!(status.as_str().parse::<LeadStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_status_rejects_unknown() {
        let err = "archived".parse::<LeadStatus>().unwrap_err();
        assert!(matches!(err, LeadError::InvalidArgument(_)));
        assert!(err.to_string().contains("not_interested"));
    }

    #[test]
    fn test_reach_lenient() {
        assert_eq!(Reach::parse_lenient("YES"), Reach::Yes);
        assert_eq!(Reach::parse_lenient("definitely"), Reach::Unknown);
        assert_eq!(Urgency::parse_lenient("urgent"), Urgency::Medium);
    }

    #[test]
    fn test_delete_filter_requires_one_field() {
        assert!(DeleteFilter::default().validate().is_err());
        let filter = DeleteFilter {
            status: Some(LeadStatus::Converted),
            ..Default::default()
        };
        assert!(filter.validate().is_ok());
    }

    #[test]
    fn test_age_cutoff() {
        let filter = DeleteFilter {
            max_age_days: Some(2),
            ..Default::default()
        };
        assert_eq!(filter.age_cutoff(1_000_000), Some(1_000_000 - 172_800));
    }

    #[test]
    fn test_lead_event_serializes_flat_item() {
        let event = LeadEvent {
            item: Item {
                id: "a1".into(),
                title: "Need mock interview help".into(),
                body: String::new(),
                author: "someone".into(),
                partition: "jobs".into(),
                engagement: 3,
                comment_count: 1,
                created_utc: 1_700_000_000,
                url: "https://reddit.com/r/jobs/a1".into(),
                permalink: "/r/jobs/a1".into(),
            },
            analysis: ScoreResult {
                score: 72,
                reasoning: "asks for practice".into(),
                recommendation: "offer a session".into(),
                reach: Reach::Yes,
                pain_points: vec!["nerves".into()],
                urgency: Urgency::High,
            }
            .analyzed_at(1_700_000_100),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], "a1");
        assert_eq!(json["commentCount"], 1);
        assert_eq!(json["analysis"]["score"], 72);
        assert_eq!(json["analysis"]["reach"], "yes");
        assert_eq!(json["analysis"]["painPoints"][0], "nerves");
    }
}
