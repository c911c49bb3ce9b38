//! Source client: keyword search against the public Reddit JSON listing.
//!
//! | Operation | Endpoint |
//! |---|---|
//! | [`SourceClient::search`] | `GET {base}/r/{partition}/search.json` |
//! | [`SourceClient::partition_info`] | `GET {base}/r/{name}/about.json` |
//!
//! Raw listing children are normalized into [`Item`]s. Items with a missing
//! or malformed timestamp are kept (with `created_utc = 0`); only children
//! without an id are dropped. Duplicate ids within one page are collapsed.
//!
//! [`search_many`] is the only place that issues upstream calls
//! concurrently.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use leadwatch_core::models::Item;
use leadwatch_core::{LeadError, Result};

use crate::config::SourceConfig;

pub const MAX_KEYWORD_CHARS: usize = 512;
pub const MAX_LIMIT: u32 = 100;

// ============ Options ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Relevance,
    Hot,
    Top,
    New,
    Comments,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Relevance => "relevance",
            SortMode::Hot => "hot",
            SortMode::Top => "top",
            SortMode::New => "new",
            SortMode::Comments => "comments",
        }
    }
}

impl FromStr for SortMode {
    type Err = LeadError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relevance" => Ok(SortMode::Relevance),
            "hot" => Ok(SortMode::Hot),
            "top" => Ok(SortMode::Top),
            "new" => Ok(SortMode::New),
            "comments" => Ok(SortMode::Comments),
            other => Err(LeadError::invalid(format!(
                "unknown sort '{}' (expected relevance, hot, top, new, comments)",
                other
            ))),
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    Hour,
    Day,
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl TimeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
            TimeWindow::Year => "year",
            TimeWindow::All => "all",
        }
    }
}

impl FromStr for TimeWindow {
    type Err = LeadError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hour" => Ok(TimeWindow::Hour),
            "day" => Ok(TimeWindow::Day),
            "week" => Ok(TimeWindow::Week),
            "month" => Ok(TimeWindow::Month),
            "year" => Ok(TimeWindow::Year),
            "all" => Ok(TimeWindow::All),
            other => Err(LeadError::invalid(format!(
                "unknown time window '{}' (expected hour, day, week, month, year, all)",
                other
            ))),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request search options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    /// Partition to search; `all` searches site-wide.
    #[serde(alias = "subreddit")]
    pub partition: String,
    pub sort: SortMode,
    pub time: TimeWindow,
    pub limit: u32,
    pub after: Option<String>,
    pub before: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            partition: "all".to_string(),
            sort: SortMode::default(),
            time: TimeWindow::default(),
            limit: 25,
            after: None,
            before: None,
        }
    }
}

impl SearchOptions {
    pub fn for_partition(partition: impl Into<String>, limit: u32) -> Self {
        Self {
            partition: partition.into(),
            limit,
            ..Default::default()
        }
    }
}

/// One page of normalized search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub items: Vec<Item>,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
}

/// Public metadata about a partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub name: String,
    pub title: String,
    pub description: String,
    pub subscribers: i64,
    pub active_users: Option<i64>,
}

/// Reject out-of-contract search requests before any network call.
pub fn validate_request(keyword: &str, options: &SearchOptions) -> Result<()> {
    let chars = keyword.chars().count();
    if chars == 0 || chars > MAX_KEYWORD_CHARS {
        return Err(LeadError::invalid(format!(
            "search query must be 1-{} characters",
            MAX_KEYWORD_CHARS
        )));
    }
    if options.limit < 1 || options.limit > MAX_LIMIT {
        return Err(LeadError::invalid(format!(
            "limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }
    if options.partition.trim().is_empty() {
        return Err(LeadError::invalid("partition must not be empty"));
    }
    Ok(())
}

// ============ Trait ============

/// A searchable content provider.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Search one partition for `keyword`.
    ///
    /// Fails with `InvalidArgument` for an empty or over-long keyword or a
    /// limit outside 1..=100, and with `UpstreamUnavailable` on network
    /// errors or non-success responses.
    async fn search(&self, keyword: &str, options: &SearchOptions) -> Result<SearchPage>;

    /// Partition metadata; `None` when the lookup fails for any reason.
    async fn partition_info(&self, name: &str) -> Option<PartitionInfo>;
}

// ============ Reddit ============

pub struct RedditClient {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl RedditClient {
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_agent: config.user_agent.clone(),
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let response = self
            .http
            .get(url)
            .header("User-Agent", &self.user_agent)
            .query(query)
            .send()
            .await
            .map_err(|e| LeadError::upstream(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeadError::upstream(format!(
                "{} returned {}",
                url, status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| LeadError::upstream(format!("invalid JSON from {}: {}", url, e)))
    }
}

#[async_trait]
impl SourceClient for RedditClient {
    async fn search(&self, keyword: &str, options: &SearchOptions) -> Result<SearchPage> {
        validate_request(keyword, options)?;

        let url = format!("{}/r/{}/search.json", self.base_url, options.partition);
        let mut query = vec![
            ("q", keyword.to_string()),
            ("sort", options.sort.as_str().to_string()),
            ("t", options.time.as_str().to_string()),
            ("limit", options.limit.to_string()),
            ("restrict_sr", (options.partition != "all").to_string()),
        ];
        if let Some(ref after) = options.after {
            query.push(("after", after.clone()));
        }
        if let Some(ref before) = options.before {
            query.push(("before", before.clone()));
        }

        tracing::debug!(keyword, partition = %options.partition, "searching source");
        let json = self.get_json(&url, &query).await?;
        Ok(parse_listing(&json))
    }

    async fn partition_info(&self, name: &str) -> Option<PartitionInfo> {
        let url = format!("{}/r/{}/about.json", self.base_url, name);
        match self.get_json(&url, &[]).await {
            Ok(json) => parse_about(&json),
            Err(e) => {
                tracing::warn!(partition = name, error = %e, "partition lookup failed");
                None
            }
        }
    }
}

/// Normalize a listing response into a [`SearchPage`].
///
/// A body without `data.children` is an empty page, not an error.
pub fn parse_listing(json: &Value) -> SearchPage {
    let Some(data) = json.get("data") else {
        return SearchPage::default();
    };
    let children = data
        .get("children")
        .and_then(|c| c.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let mut seen = HashSet::new();
    let items = children
        .iter()
        .filter_map(|child| normalize_post(child.get("data")?))
        .filter(|item| seen.insert(item.id.clone()))
        .collect();

    SearchPage {
        items,
        next_cursor: str_field(data, "after"),
        prev_cursor: str_field(data, "before"),
    }
}

fn normalize_post(post: &Value) -> Option<Item> {
    let id = str_field(post, "id").filter(|id| !id.is_empty())?;
    let permalink = str_field(post, "permalink").unwrap_or_default();

    Some(Item {
        id,
        title: str_field(post, "title").unwrap_or_default(),
        body: str_field(post, "selftext").unwrap_or_default(),
        author: str_field(post, "author").unwrap_or_default(),
        partition: str_field(post, "subreddit").unwrap_or_default(),
        engagement: int_field(post, "score").unwrap_or(0),
        comment_count: int_field(post, "num_comments").unwrap_or(0),
        created_utc: int_field(post, "created_utc").unwrap_or(0),
        url: format!("https://reddit.com{}", permalink),
        permalink,
    })
}

fn parse_about(json: &Value) -> Option<PartitionInfo> {
    let data = json.get("data")?;
    Some(PartitionInfo {
        name: str_field(data, "display_name")?,
        title: str_field(data, "title").unwrap_or_default(),
        description: str_field(data, "public_description").unwrap_or_default(),
        subscribers: int_field(data, "subscribers").unwrap_or(0),
        active_users: int_field(data, "active_user_count"),
    })
}

fn str_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(|s| s.as_str()).map(str::to_string)
}

/// Integer field that may arrive as an integer, a float, or a numeric string.
fn int_field(v: &Value, key: &str) -> Option<i64> {
    match v.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}

// ============ Multi-keyword ============

/// Search every keyword concurrently and merge the results.
///
/// Per-keyword failures are logged and contribute nothing. The merged set is
/// deduplicated by id (first occurrence wins) and sorted by engagement,
/// highest first. Cursors are ignored: this mode does not paginate.
pub async fn search_many(
    client: &dyn SourceClient,
    keywords: &[String],
    options: &SearchOptions,
) -> Vec<Item> {
    let options = SearchOptions {
        after: None,
        before: None,
        ..options.clone()
    };

    let pages = futures::future::join_all(keywords.iter().map(|keyword| {
        let options = &options;
        async move {
            match client.search(keyword, options).await {
                Ok(page) => page.items,
                Err(e) => {
                    tracing::warn!(keyword = %keyword, error = %e, "keyword search failed");
                    Vec::new()
                }
            }
        }
    }))
    .await;

    let mut seen = HashSet::new();
    let mut merged: Vec<Item> = pages
        .into_iter()
        .flatten()
        .filter(|item| seen.insert(item.id.clone()))
        .collect();
    // stable: equal engagement keeps merge order
    merged.sort_by(|a, b| b.engagement.cmp(&a.engagement));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn child(id: &str, score: Value, created: Value) -> Value {
        json!({
            "kind": "t3",
            "data": {
                "id": id,
                "title": format!("title {}", id),
                "selftext": "help me prepare",
                "author": "someone",
                "subreddit": "jobs",
                "score": score,
                "num_comments": 4,
                "created_utc": created,
                "permalink": format!("/r/jobs/comments/{}/x/", id),
            }
        })
    }

    #[test]
    fn test_parse_listing_normalizes() {
        let json = json!({
            "data": {
                "children": [child("a1", json!(12), json!(1700000000.0))],
                "after": "t3_a1",
                "before": null,
            }
        });
        let page = parse_listing(&json);
        assert_eq!(page.items.len(), 1);
        let item = &page.items[0];
        assert_eq!(item.id, "a1");
        assert_eq!(item.partition, "jobs");
        assert_eq!(item.engagement, 12);
        assert_eq!(item.comment_count, 4);
        assert_eq!(item.created_utc, 1_700_000_000);
        assert_eq!(item.url, "https://reddit.com/r/jobs/comments/a1/x/");
        assert_eq!(page.next_cursor.as_deref(), Some("t3_a1"));
        assert_eq!(page.prev_cursor, None);
    }

    #[test]
    fn test_malformed_timestamp_kept() {
        let json = json!({
            "data": {
                "children": [
                    child("a", json!(1), json!("1700000000")),
                    child("b", json!(1), json!("yesterday")),
                    child("c", json!(1), Value::Null),
                ]
            }
        });
        let page = parse_listing(&json);
        let created: Vec<_> = page.items.iter().map(|i| i.created_utc).collect();
        assert_eq!(created, vec![1_700_000_000, 0, 0]);
    }

    #[test]
    fn test_page_dedupes_and_skips_missing_ids() {
        let json = json!({
            "data": {
                "children": [
                    child("a", json!(1), json!(1)),
                    child("a", json!(99), json!(1)),
                    {"kind": "t3", "data": {"title": "no id"}},
                ]
            }
        });
        let page = parse_listing(&json);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].engagement, 1);
    }

    #[test]
    fn test_missing_data_is_empty_page() {
        assert_eq!(parse_listing(&json!({"error": 429})), SearchPage::default());
    }

    #[test]
    fn test_validate_request() {
        let opts = SearchOptions::default();
        assert!(validate_request("mock interview", &opts).is_ok());
        assert!(matches!(
            validate_request("", &opts),
            Err(LeadError::InvalidArgument(_))
        ));
        assert!(validate_request(&"x".repeat(512), &opts).is_ok());
        assert!(validate_request(&"x".repeat(513), &opts).is_err());

        let zero = SearchOptions {
            limit: 0,
            ..Default::default()
        };
        assert!(validate_request("ok", &zero).is_err());
        let big = SearchOptions {
            limit: 101,
            ..Default::default()
        };
        assert!(validate_request("ok", &big).is_err());
    }

    #[test]
    fn test_parse_about() {
        let json = json!({
            "data": {
                "display_name": "jobs",
                "title": "Jobs",
                "public_description": "career talk",
                "subscribers": 1000,
                "active_user_count": null,
            }
        });
        let info = parse_about(&json).unwrap();
        assert_eq!(info.name, "jobs");
        assert_eq!(info.subscribers, 1000);
        assert_eq!(info.active_users, None);
    }

    #[test]
    fn test_sort_and_time_parse() {
        assert_eq!("top".parse::<SortMode>().unwrap(), SortMode::Top);
        assert_eq!("week".parse::<TimeWindow>().unwrap(), TimeWindow::Week);
        assert!("best".parse::<SortMode>().is_err());
        assert!("decade".parse::<TimeWindow>().is_err());
    }

    struct Canned;

    #[async_trait]
    impl SourceClient for Canned {
        async fn search(&self, keyword: &str, _options: &SearchOptions) -> Result<SearchPage> {
            let item = |id: &str, engagement: i64| Item {
                id: id.into(),
                title: keyword.into(),
                body: String::new(),
                author: String::new(),
                partition: "jobs".into(),
                engagement,
                comment_count: 0,
                created_utc: 0,
                url: String::new(),
                permalink: String::new(),
            };
            match keyword {
                "first" => Ok(SearchPage {
                    items: vec![item("x", 5), item("y", 1)],
                    ..Default::default()
                }),
                "second" => Ok(SearchPage {
                    items: vec![item("y", 50), item("z", 9)],
                    ..Default::default()
                }),
                _ => Err(LeadError::upstream("boom")),
            }
        }

        async fn partition_info(&self, _name: &str) -> Option<PartitionInfo> {
            None
        }
    }

    #[tokio::test]
    async fn test_search_many_merges() {
        let keywords = vec!["first".to_string(), "broken".to_string(), "second".to_string()];
        let merged = search_many(&Canned, &keywords, &SearchOptions::default()).await;
        let ids: Vec<_> = merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "x", "y"]);
        // first occurrence of "y" wins
        let y = merged.iter().find(|i| i.id == "y").unwrap();
        assert_eq!(y.title, "first");
        assert_eq!(y.engagement, 1);
    }
}
