use serde::{Deserialize, Serialize};

use super::KeywordRecord;
use crate::domain::Platform;

/// A browsable category or collection on one marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub platform: Platform,
    pub id: String,
    pub name: String,
    /// Ancestors first, the category itself last.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

/// A single listing looked up by its marketplace id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDetails {
    pub platform: Platform,
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// The listing scored the same way a search result would be.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<KeywordRecord>,
}
