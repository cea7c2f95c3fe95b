mod platforms;
mod search;
mod trending;

pub use platforms::{cmd_health, cmd_platforms};
pub use search::{SearchArgs, cmd_search};
pub use trending::cmd_trending;

use crate::models::KeywordRecord;

fn print_keyword_table(keywords: &[KeywordRecord]) {
    println!(
        "{:<4} {:<36} {:<9} {:>8} {:>10} {:>6} {:>5} {:<7} {:<6}",
        "#", "Keyword", "Platform", "Volume", "Revenue", "CPC", "Diff", "Comp", "Trend"
    );
    println!("{:-<100}", "");

    for (i, k) in keywords.iter().enumerate() {
        println!(
            "{:<4} {:<36} {:<9} {:>8} {:>10.2} {:>6.2} {:>5} {:<7} {:<6}",
            i + 1,
            truncate(&k.term, 36),
            k.platform,
            k.search_volume,
            k.potential_revenue,
            k.cpc,
            k.difficulty.value(),
            k.competition,
            k.trend,
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
