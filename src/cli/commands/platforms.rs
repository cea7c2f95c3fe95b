use crate::config::Config;
use crate::services::PlatformStatus;
use crate::state::SharedState;

pub async fn cmd_platforms(config: &Config) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;
    let stats = state.keywords.platform_stats().await;

    println!(
        "{:<10} {:<9} {:>8} {:>8}  {}",
        "Platform", "Status", "Req/s", "Req/day", "Features"
    );
    println!("{:-<80}", "");

    for stat in stats.values() {
        let status = match stat.status {
            PlatformStatus::Active => "active",
            PlatformStatus::Disabled => "disabled",
        };
        let (per_second, per_day) = stat.rate_limit.map_or_else(
            || ("-".to_string(), "-".to_string()),
            |r| {
                (
                    r.requests_per_second.to_string(),
                    r.requests_per_day.to_string(),
                )
            },
        );

        println!(
            "{:<10} {:<9} {:>8} {:>8}  {}",
            stat.name,
            status,
            per_second,
            per_day,
            stat.features.join(", ")
        );
    }

    Ok(())
}

pub async fn cmd_health(config: &Config) -> anyhow::Result<()> {
    let state = SharedState::new(config.clone()).await?;

    println!("Probing marketplaces...");
    let health = state.keywords.health_check().await;

    if health.is_empty() {
        println!("No platforms are enabled.");
        return Ok(());
    }

    for (platform, healthy) in &health {
        let mark = if *healthy { "✓" } else { "✗" };
        println!("  {mark} {}", platform.display_name());
    }

    let failing = health.values().filter(|ok| !**ok).count();
    if failing > 0 {
        println!();
        println!("{failing} platform(s) failed; run with RUST_LOG=debug for details.");
    }

    Ok(())
}
