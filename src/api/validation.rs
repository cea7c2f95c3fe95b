use regex::Regex;
use std::sync::OnceLock;

use super::ApiError;
use crate::domain::Platform;
use crate::models::PlatformSelection;

pub const MIN_KEYWORD_LEN: usize = 2;
pub const MAX_KEYWORD_LEN: usize = 100;

fn keyword_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9\s\-_]+$").expect("Invalid regex"))
}

fn native_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9|\-_.]{1,128}$").expect("Invalid regex"))
}

pub fn validate_keyword(keyword: Option<&str>) -> Result<&str, ApiError> {
    let trimmed = keyword.map(str::trim).unwrap_or_default();

    if trimmed.is_empty() {
        return Err(ApiError::validation("Keyword is required"));
    }

    let len = trimmed.chars().count();
    if !(MIN_KEYWORD_LEN..=MAX_KEYWORD_LEN).contains(&len) {
        return Err(ApiError::validation(format!(
            "Keyword must be between {MIN_KEYWORD_LEN} and {MAX_KEYWORD_LEN} characters"
        )));
    }

    if !keyword_regex().is_match(trimmed) {
        return Err(ApiError::validation(
            "Keyword can only contain letters, numbers, spaces, hyphens, and underscores",
        ));
    }

    Ok(trimmed)
}

pub fn validate_limit(limit: usize, max: usize) -> Result<usize, ApiError> {
    const MIN_LIMIT: usize = 1;

    if !(MIN_LIMIT..=max).contains(&limit) {
        return Err(ApiError::validation(format!(
            "Invalid limit: {limit}. Limit must be between {MIN_LIMIT} and {max}"
        )));
    }
    Ok(limit)
}

/// Merges the `platform` and comma separated `platforms` parameters.
pub fn parse_platforms(
    platform: Option<&str>,
    platforms: Option<&str>,
) -> Result<PlatformSelection, ApiError> {
    let names = platforms
        .into_iter()
        .flat_map(|list| list.split(','))
        .chain(platform);

    PlatformSelection::parse(names)
        .ok_or_else(|| ApiError::validation("No supported platform in request"))
}

/// Marketplace ids for items, shops and collections. eBay ids contain `|`.
pub fn validate_native_id<'a>(kind: &str, id: &'a str) -> Result<&'a str, ApiError> {
    let id = id.trim();
    if native_id_regex().is_match(id) {
        Ok(id)
    } else {
        Err(ApiError::validation(format!("Invalid {kind} id: {id}")))
    }
}

/// Exactly one platform; `all` is rejected.
pub fn parse_required_platform(platform: Option<&str>) -> Result<Platform, ApiError> {
    parse_single_platform(platform)?
        .ok_or_else(|| ApiError::validation("A single platform is required"))
}

/// `None` for a missing value or `all`.
pub fn parse_single_platform(platform: Option<&str>) -> Result<Option<Platform>, ApiError> {
    match platform.map(str::trim) {
        None | Some("") => Ok(None),
        Some(name) if name.eq_ignore_ascii_case("all") => Ok(None),
        Some(name) => name
            .parse()
            .map(Some)
            .map_err(|e| ApiError::validation(format!("{e}"))),
    }
}
