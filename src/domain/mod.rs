//! Domain primitives for keyword research with strong typing.
//!
//! Marketplaces, trend direction and competition levels are closed
//! enumerations so an unknown platform or level can never travel past the
//! parsing boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A marketplace keyscout can query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    Etsy,
    Ebay,
    Shopify,
    Gumroad,
}

impl Platform {
    /// Every platform, in dispatch order.
    pub const ALL: [Self; 5] = [
        Self::Amazon,
        Self::Etsy,
        Self::Ebay,
        Self::Shopify,
        Self::Gumroad,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Amazon => "amazon",
            Self::Etsy => "etsy",
            Self::Ebay => "ebay",
            Self::Shopify => "shopify",
            Self::Gumroad => "gumroad",
        }
    }

    /// Human readable name used in log lines and stats.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Amazon => "Amazon",
            Self::Etsy => "Etsy",
            Self::Ebay => "eBay",
            Self::Shopify => "Shopify",
            Self::Gumroad => "Gumroad",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Returned when a string does not name a known platform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Ok(Self::Amazon),
            "etsy" => Ok(Self::Etsy),
            "ebay" => Ok(Self::Ebay),
            "shopify" => Ok(Self::Shopify),
            "gumroad" => Ok(Self::Gumroad),
            _ => Err(UnknownPlatform(s.to_string())),
        }
    }
}

/// Direction a keyword's demand is moving in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Stable => "stable",
        })
    }
}

/// Discrete competition level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Competition {
    Low,
    Medium,
    High,
}

impl Competition {
    /// Midpoint score for this level, for callers that need a continuous value.
    #[must_use]
    pub const fn representative_score(self) -> CompetitionScore {
        match self {
            Self::Low => CompetitionScore(0.17),
            Self::Medium => CompetitionScore(0.5),
            Self::High => CompetitionScore(0.83),
        }
    }
}

impl fmt::Display for Competition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

/// Continuous competition score in `[0, 1]`.
///
/// Not interchangeable with [`Competition`]; convert with
/// [`CompetitionScore::level`] or [`Competition::representative_score`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct CompetitionScore(f64);

impl CompetitionScore {
    /// Creates a score, clamping into `[0, 1]`. NaN becomes 0.
    #[must_use]
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self(0.0)
        } else {
            Self(value.clamp(0.0, 1.0))
        }
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Maps the score onto the discrete scale: below 0.34 is low, below
    /// 0.67 is medium, anything else is high.
    #[must_use]
    pub fn level(self) -> Competition {
        if self.0 < 0.34 {
            Competition::Low
        } else if self.0 < 0.67 {
            Competition::Medium
        } else {
            Competition::High
        }
    }
}

impl<'de> Deserialize<'de> for CompetitionScore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// Keyword difficulty, always within `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MAX: u8 = 100;

    /// Clamps any signed value into the valid range.
    #[must_use]
    pub fn clamped(value: i64) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let v = value.clamp(0, i64::from(Self::MAX)) as u8;
        Self(v)
    }

    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Ok(Self::clamped(value))
    }
}

/// Lowercases, trims and collapses inner whitespace.
#[must_use]
pub fn normalize_term(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parsing_is_case_insensitive() {
        assert_eq!("Etsy".parse::<Platform>(), Ok(Platform::Etsy));
        assert_eq!(" EBAY ".parse::<Platform>(), Ok(Platform::Ebay));
        assert!("walmart".parse::<Platform>().is_err());
        assert!("all".parse::<Platform>().is_err());
    }

    #[test]
    fn platform_serializes_lowercase() {
        let json = serde_json::to_string(&Platform::Shopify).unwrap();
        assert_eq!(json, "\"shopify\"");
        let back: Platform = serde_json::from_str("\"gumroad\"").unwrap();
        assert_eq!(back, Platform::Gumroad);
    }

    #[test]
    fn difficulty_is_clamped() {
        assert_eq!(Difficulty::clamped(-5).value(), 0);
        assert_eq!(Difficulty::clamped(42).value(), 42);
        assert_eq!(Difficulty::clamped(135).value(), 100);

        let parsed: Difficulty = serde_json::from_str("250").unwrap();
        assert_eq!(parsed.value(), 100);
    }

    #[test]
    fn competition_score_mapping_is_explicit() {
        assert_eq!(CompetitionScore::new(0.1).level(), Competition::Low);
        assert_eq!(CompetitionScore::new(0.5).level(), Competition::Medium);
        assert_eq!(CompetitionScore::new(0.9).level(), Competition::High);
        assert!((CompetitionScore::new(3.0).value() - 1.0).abs() < f64::EPSILON);
        assert!(CompetitionScore::new(f64::NAN).value().abs() < f64::EPSILON);

        for level in [Competition::Low, Competition::Medium, Competition::High] {
            assert_eq!(level.representative_score().level(), level);
        }
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_term("  Digital   PLANNER "), "digital planner");
        assert_eq!(normalize_term("   "), "");
    }
}
