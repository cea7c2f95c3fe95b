use crate::config::Config;
use crate::domain::Platform;
use crate::state::SharedState;

use super::print_keyword_table;

pub async fn cmd_trending(config: &Config, platform: Option<&str>, json: bool) -> anyhow::Result<()> {
    let platform = match platform.map(str::trim) {
        None | Some("all") => None,
        Some(name) => match name.parse::<Platform>() {
            Ok(p) => Some(p),
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        },
    };

    let state = SharedState::new(config.clone()).await?;
    let trending = state.keywords.trending_keywords(platform).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&trending)?);
        return Ok(());
    }

    if trending.is_empty() {
        println!("No trending keywords available.");
        println!("Trending data comes from Etsy, eBay and Shopify; check their credentials.");
        return Ok(());
    }

    println!(
        "Trending keywords ({})",
        platform.map_or("all platforms", Platform::display_name)
    );
    println!();
    print_keyword_table(&trending);

    Ok(())
}
