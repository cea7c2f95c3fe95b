use crate::config::Config;
use crate::models::{PlatformSelection, SearchOptions};
use crate::state::SharedState;

use super::print_keyword_table;

pub struct SearchArgs<'a> {
    pub query: &'a str,
    pub platforms: &'a [String],
    pub limit: Option<usize>,
    pub related: bool,
    pub trends: bool,
    pub json: bool,
}

pub async fn cmd_search(config: &Config, args: SearchArgs<'_>) -> anyhow::Result<()> {
    let Some(platforms) = PlatformSelection::parse(args.platforms) else {
        println!("No supported platform given. Use: amazon, etsy, ebay, shopify, gumroad, all");
        return Ok(());
    };

    let state = SharedState::new(config.clone()).await?;

    let options = SearchOptions {
        platforms,
        max_results: args.limit.unwrap_or(config.search.default_max_results),
        include_related: args.related,
        include_trends: args.trends,
        cache_ttl_seconds: None,
    };

    let result = state.keywords.search_keywords(args.query, options).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.keywords.is_empty() {
        println!("No keywords found for '{}'", args.query);
        return Ok(());
    }

    println!("Keywords for: {}", args.query);
    println!();
    print_keyword_table(&result.keywords);
    println!();

    let platforms: Vec<&str> = result.platforms.iter().map(|p| p.as_str()).collect();
    println!(
        "{} results from {} in {}ms{}",
        result.total_results,
        platforms.join(", "),
        result.search_time_ms,
        if result.cached { " (cached)" } else { "" }
    );

    if let Some(summary) = result.trend_summary {
        println!(
            "Trends: {} up, {} stable, {} down",
            summary.up, summary.stable, summary.down
        );
    }

    Ok(())
}
