use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::Platform;

/// Which platforms a request targets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformSelection {
    #[default]
    All,
    Only(Vec<Platform>),
}

impl PlatformSelection {
    /// Parses a list of user supplied names.
    ///
    /// `"all"` anywhere selects every platform. Unknown names are skipped with
    /// a warning. Returns `None` when nothing usable remains.
    #[must_use]
    pub fn parse<I, S>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut platforms = Vec::new();
        let mut saw_any = false;

        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            saw_any = true;

            if name.eq_ignore_ascii_case("all") {
                return Some(Self::All);
            }

            match name.parse::<Platform>() {
                Ok(p) if !platforms.contains(&p) => platforms.push(p),
                Ok(_) => {}
                Err(e) => warn!("Skipping requested platform: {}", e),
            }
        }

        if !saw_any {
            return Some(Self::All);
        }

        if platforms.is_empty() {
            None
        } else {
            Some(Self::Only(platforms))
        }
    }

    /// Resolves to a concrete list in dispatch order.
    #[must_use]
    pub fn resolve(&self) -> Vec<Platform> {
        match self {
            Self::All => Platform::ALL.to_vec(),
            Self::Only(list) => {
                let mut seen = Vec::with_capacity(list.len());
                for p in list {
                    if !seen.contains(p) {
                        seen.push(*p);
                    }
                }
                seen
            }
        }
    }

    /// Sorted, comma separated platform names for cache keys.
    #[must_use]
    pub fn cache_fragment(&self) -> String {
        let mut names: Vec<&str> = self.resolve().into_iter().map(Platform::as_str).collect();
        names.sort_unstable();
        names.join(",")
    }
}

/// Options for one aggregation call.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub platforms: PlatformSelection,
    pub max_results: usize,
    pub include_related: bool,
    pub include_trends: bool,
    pub cache_ttl_seconds: Option<u64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            platforms: PlatformSelection::All,
            max_results: 50,
            include_related: false,
            include_trends: false,
            cache_ttl_seconds: None,
        }
    }
}
