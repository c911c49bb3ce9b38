//! `leadwatch search`: ad-hoc source search, nothing is stored.

use anyhow::Result;

use crate::config::Config;
use crate::source::{
    search_many, validate_request, RedditClient, SearchOptions, SortMode, SourceClient, TimeWindow,
};

pub async fn run_search(
    config: &Config,
    keywords: &[String],
    partition: &str,
    sort: SortMode,
    time: TimeWindow,
    limit: u32,
) -> Result<()> {
    let options = SearchOptions {
        partition: partition.to_string(),
        sort,
        time,
        limit,
        ..Default::default()
    };
    for keyword in keywords {
        validate_request(keyword, &options)?;
    }

    let client = RedditClient::new(&config.source)?;
    let items = match keywords {
        [keyword] => client.search(keyword, &options).await?.items,
        _ => search_many(&client, keywords, &options).await,
    };

    if items.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, item) in items.iter().enumerate() {
        println!(
            "{}. [{}] r/{}  ({} points, {} comments)",
            i + 1,
            item.id,
            item.partition,
            item.engagement,
            item.comment_count
        );
        println!("    {}", item.title);
        println!("    {}", item.url);
    }
    println!();
    println!("{} result(s)", items.len());
    Ok(())
}
