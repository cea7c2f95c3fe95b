//! Heuristics shared by the marketplace adapters.
//!
//! Every number here is a placeholder estimate, not a measured value.

use chrono::{DateTime, Utc};

use crate::domain::{Competition, Difficulty, Platform};

use super::estimator::VolumeEstimator;

/// Purchase probability per visit at each competition level.
#[must_use]
pub const fn conversion_rate(platform: Platform, competition: Competition) -> f64 {
    let (low, medium, high) = match platform {
        Platform::Amazon => (0.05, 0.03, 0.01),
        Platform::Etsy => (0.08, 0.05, 0.03),
        Platform::Ebay => (0.03, 0.02, 0.01),
        Platform::Shopify => (0.05, 0.03, 0.02),
        Platform::Gumroad => (0.10, 0.06, 0.03),
    };
    match competition {
        Competition::Low => low,
        Competition::Medium => medium,
        Competition::High => high,
    }
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn potential_revenue(
    platform: Platform,
    volume: u64,
    price: f64,
    competition: Competition,
) -> f64 {
    volume as f64 * conversion_rate(platform, competition) * price
}

struct DifficultyProfile {
    base: i64,
    high: i64,
    medium: i64,
    /// `(threshold, bonus)`, highest threshold first.
    volume_steps: [(u64, i64); 2],
}

const fn difficulty_profile(platform: Platform) -> DifficultyProfile {
    match platform {
        Platform::Amazon => DifficultyProfile {
            base: 50,
            high: 30,
            medium: 15,
            volume_steps: [(5000, 20), (1000, 10)],
        },
        Platform::Etsy => DifficultyProfile {
            base: 40,
            high: 25,
            medium: 15,
            volume_steps: [(3000, 15), (1000, 10)],
        },
        Platform::Ebay => DifficultyProfile {
            base: 60,
            high: 25,
            medium: 15,
            volume_steps: [(5000, 20), (1000, 10)],
        },
        Platform::Shopify => DifficultyProfile {
            base: 50,
            high: 30,
            medium: 15,
            volume_steps: [(3000, 20), (1000, 10)],
        },
        Platform::Gumroad => DifficultyProfile {
            base: 30,
            high: 30,
            medium: 15,
            volume_steps: [(2000, 20), (500, 10)],
        },
    }
}

/// Base difficulty plus competition and volume bonuses, clamped to `[0, 100]`.
#[must_use]
pub fn difficulty(platform: Platform, competition: Competition, volume: u64) -> Difficulty {
    let profile = difficulty_profile(platform);

    let mut score = profile.base;
    score += match competition {
        Competition::High => profile.high,
        Competition::Medium => profile.medium,
        Competition::Low => 0,
    };
    if let Some((_, bonus)) = profile
        .volume_steps
        .iter()
        .find(|(threshold, _)| volume > *threshold)
    {
        score += bonus;
    }

    Difficulty::clamped(score)
}

/// `base + jitter(0..spread)`.
#[must_use]
pub fn jittered(estimator: &dyn VolumeEstimator, base: u64, spread: u64) -> u64 {
    base.saturating_add(estimator.jitter(spread))
}

/// CPC for a category that must match a table key exactly (case-insensitive).
#[must_use]
pub fn cpc_exact(table: &[(&str, f64)], category: &str, fallback: f64) -> f64 {
    let category = category.trim().to_lowercase();
    table
        .iter()
        .find(|(key, _)| *key == category)
        .map_or(fallback, |(_, rate)| *rate)
}

/// CPC for the first table key contained in the category.
#[must_use]
pub fn cpc_containing(table: &[(&str, f64)], category: &str, fallback: f64) -> f64 {
    let category = category.to_lowercase();
    table
        .iter()
        .find(|(key, _)| category.contains(key))
        .map_or(fallback, |(_, rate)| *rate)
}

/// Picks the phrase a listing is most likely found under.
///
/// Tags containing a query token win; otherwise the title words containing
/// a query token; otherwise the first three title words.
#[must_use]
pub fn extract_term(query: &str, tags: &[String], title: &str) -> String {
    let query = query.to_lowercase();
    let tokens: Vec<&str> = query.split_whitespace().collect();
    let matches = |candidate: &str| tokens.iter().any(|t| candidate.contains(t));

    if let Some(tag) = tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .find(|t| !t.is_empty() && matches(t))
    {
        return tag;
    }

    let title = title.to_lowercase();
    let words: Vec<&str> = title.split_whitespace().collect();

    let common: Vec<&str> = words.iter().copied().filter(|w| matches(w)).collect();
    if !common.is_empty() {
        return common.join(" ");
    }

    words.into_iter().take(3).collect::<Vec<_>>().join(" ")
}

/// Whole days since `created`, zero for timestamps in the future.
#[must_use]
pub fn age_in_days(created: DateTime<Utc>) -> i64 {
    (Utc::now() - created).num_days().max(0)
}

/// Parses a decimal price string; malformed or negative input reads as 0.
#[must_use]
pub fn parse_price(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|p| p.is_finite() && *p > 0.0)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_stays_in_range() {
        for platform in Platform::ALL {
            for competition in [Competition::Low, Competition::Medium, Competition::High] {
                for volume in [0, 600, 1500, 4000, 50_000] {
                    let d = difficulty(platform, competition, volume);
                    assert!(d.value() <= Difficulty::MAX);
                }
            }
        }
        // 60 + 25 + 20 would overflow without the clamp.
        assert_eq!(difficulty(Platform::Ebay, Competition::High, 9000).value(), 100);
    }

    #[test]
    fn difficulty_steps() {
        assert_eq!(difficulty(Platform::Etsy, Competition::Low, 10).value(), 40);
        assert_eq!(difficulty(Platform::Etsy, Competition::Medium, 1500).value(), 65);
        assert_eq!(difficulty(Platform::Gumroad, Competition::Low, 600).value(), 40);
    }

    #[test]
    fn revenue_uses_platform_conversion() {
        let r = potential_revenue(Platform::Etsy, 1000, 10.0, Competition::Low);
        assert!((r - 800.0).abs() < 1e-9);
        let r = potential_revenue(Platform::Amazon, 1000, 10.0, Competition::High);
        assert!((r - 100.0).abs() < 1e-9);
    }

    #[test]
    fn term_prefers_matching_tags() {
        let tags = vec!["Wedding".to_string(), "Digital Planner".to_string()];
        assert_eq!(
            extract_term("planner", &tags, "Undated weekly planner PDF"),
            "digital planner"
        );
    }

    #[test]
    fn term_falls_back_to_title_words() {
        assert_eq!(
            extract_term("planner", &[], "Undated Weekly Planner PDF"),
            "planner"
        );
        assert_eq!(
            extract_term("ebook", &[], "The Complete Guide To Baking"),
            "the complete guide"
        );
    }

    #[test]
    fn cpc_tables() {
        let table = [("jewelry", 0.8), ("home & living", 0.6)];
        assert!((cpc_exact(&table, "Jewelry", 0.5) - 0.8).abs() < f64::EPSILON);
        assert!((cpc_exact(&table, "toys", 0.5) - 0.5).abs() < f64::EPSILON);
        assert!((cpc_containing(&table, "Fine Jewelry & Watches", 1.0) - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn price_parsing() {
        assert!((parse_price("12.50") - 12.5).abs() < f64::EPSILON);
        assert!(parse_price("free").abs() < f64::EPSILON);
        assert!(parse_price("-3").abs() < f64::EPSILON);
    }
}
