use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use leadwatch::config::load_config;
use leadwatch::sqlite_store::SqliteLeadStore;
use leadwatch_core::models::{Item, LeadStatus, Reach, ScoreResult, Urgency};
use leadwatch_core::store::LeadStore;

fn leadwatch_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("leadwatch");
    path
}

/// Temp dir with a config whose source points at a closed local port and
/// whose scoring provider is off, so no command reaches the network.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/leads.sqlite"

[server]
bind = "127.0.0.1:0"

[source]
base_url = "http://127.0.0.1:9"
timeout_secs = 2

[scoring]
provider = "disabled"

[monitoring]
keywords = ["mock interview", "resume review"]
partitions = ["jobs"]
interval = "0 * * * *"
limit = 10
min_score = 60
keyword_delay_ms = 0
partition_delay_ms = 0
"#,
        root.display()
    );

    let config_path = config_dir.join("leadwatch.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_leadwatch(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = leadwatch_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run leadwatch binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn item(id: &str, title: &str, age_days: i64) -> Item {
    Item {
        id: id.to_string(),
        title: title.to_string(),
        body: String::new(),
        author: "tester".into(),
        partition: "jobs".into(),
        engagement: 1,
        comment_count: 0,
        created_utc: chrono::Utc::now().timestamp() - age_days * 86_400,
        url: format!("https://reddit.com/r/jobs/comments/{}/", id),
        permalink: format!("/r/jobs/comments/{}/", id),
    }
}

/// Store three leads through the library: two analyzed, one pending.
async fn seed(config_path: &Path) {
    let config = load_config(config_path).unwrap();
    let store = SqliteLeadStore::open(&config).await.unwrap();
    store
        .insert_many(
            &[
                item("fresh", "Anyone do mock interviews?", 1),
                item("stale", "Old resume thread", 40),
                item("pending", "Not scored yet", 2),
            ],
            "mock interview",
        )
        .await
        .unwrap();

    for (id, score) in [("fresh", 85u8), ("stale", 30)] {
        let result = ScoreResult {
            score,
            reasoning: "test".into(),
            recommendation: format!("follow up on {}", id),
            reach: Reach::Maybe,
            pain_points: vec![],
            urgency: Urgency::Low,
        };
        store
            .record_analysis(id, &result.analyzed_at(1_700_000_000))
            .await
            .unwrap();
    }
    store
        .set_status("stale", LeadStatus::NotInterested, None)
        .await
        .unwrap();
    store.close().await;
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_leadwatch(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/leads.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_leadwatch(&config_path, &["init"]);
    assert!(success);
    let (stdout, stderr, success) = run_leadwatch(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
}

#[test]
fn test_invalid_config_is_an_error() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[db\npath = ").unwrap();

    let (_, stderr, success) = run_leadwatch(&config_path, &["init"]);
    assert!(!success);
    assert!(!stderr.is_empty());
}

#[test]
fn test_stats_empty() {
    let (_tmp, config_path) = setup_test_env();
    run_leadwatch(&config_path, &["init"]);

    let (stdout, stderr, success) = run_leadwatch(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Leads:       0"));
    assert!(stdout.contains("Avg score:   -"));
}

#[tokio::test]
async fn test_stats_counts_and_breakdown() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path).await;

    let (stdout, stderr, success) = run_leadwatch(&config_path, &["stats"]);
    assert!(success, "stats failed: {}", stderr);
    assert!(stdout.contains("Leads:       3"));
    assert!(stdout.contains("Analyzed:    2 / 3 (66%)"));
    assert!(stdout.contains("Pending:     1"));
    assert!(stdout.contains("Avg score:   57.5"));
    assert!(stdout.contains("mock interview"));
}

#[test]
fn test_leads_empty() {
    let (_tmp, config_path) = setup_test_env();
    run_leadwatch(&config_path, &["init"]);

    let (stdout, _, success) = run_leadwatch(&config_path, &["leads"]);
    assert!(success);
    assert!(stdout.contains("No leads found."));
}

#[tokio::test]
async fn test_leads_lists_analyzed_best_first() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path).await;

    let (stdout, stderr, success) = run_leadwatch(&config_path, &["leads"]);
    assert!(success, "leads failed: {}", stderr);
    assert!(stdout.contains("2 lead(s)"));
    assert!(!stdout.contains("pending"));
    let fresh = stdout.find("fresh").unwrap();
    let stale = stdout.find("stale").unwrap();
    assert!(fresh < stale);
    assert!(stdout.contains("follow up on fresh"));

    let (stdout, _, _) = run_leadwatch(&config_path, &["leads", "--min-score", "50"]);
    assert!(stdout.contains("1 lead(s)"));

    let (stdout, _, _) = run_leadwatch(&config_path, &["leads", "--status", "not_interested"]);
    assert!(stdout.contains("stale"));
    assert!(stdout.contains("1 lead(s)"));

    let (_, _, success) = run_leadwatch(&config_path, &["leads", "--status", "archived"]);
    assert!(!success);
}

#[test]
fn test_purge_without_filter_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_leadwatch(&config_path, &["init"]);

    let (_, stderr, success) = run_leadwatch(&config_path, &["purge"]);
    assert!(!success);
    assert!(stderr.contains("refusing to purge without a filter"));
}

#[tokio::test]
async fn test_purge_dry_run_then_delete() {
    let (_tmp, config_path) = setup_test_env();
    seed(&config_path).await;

    let (stdout, stderr, success) =
        run_leadwatch(&config_path, &["purge", "--max-age-days", "30", "--dry-run"]);
    assert!(success, "dry run failed: {}", stderr);
    assert!(stdout.contains("Would delete 1 lead(s)."));

    let (stdout, _, _) = run_leadwatch(&config_path, &["stats"]);
    assert!(stdout.contains("Leads:       3"));

    let (stdout, _, success) = run_leadwatch(&config_path, &["purge", "--max-age-days", "30"]);
    assert!(success);
    assert!(stdout.contains("Deleted 1 lead(s)."));

    let (stdout, _, _) = run_leadwatch(&config_path, &["stats"]);
    assert!(stdout.contains("Leads:       2"));
}

/// With the source unreachable every search fails, but the cycle itself
/// completes and reports the failures.
#[test]
fn test_run_survives_unreachable_source() {
    let (_tmp, config_path) = setup_test_env();
    run_leadwatch(&config_path, &["init"]);

    let (stdout, stderr, success) = run_leadwatch(&config_path, &["run"]);
    assert!(success, "run failed: {}", stderr);
    assert!(stdout.contains("Cycle completed."));
    assert!(stdout.contains("Keywords searched: 2"));
    assert!(stdout.contains("Keywords failed:   2"));
    assert!(stdout.contains("Scoring is disabled"));
}

#[test]
fn test_search_rejects_bad_sort() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_leadwatch(&config_path, &["search", "mock interview", "--sort", "loudest"]);
    assert!(!success);
    assert!(stderr.contains("loudest"));
}
