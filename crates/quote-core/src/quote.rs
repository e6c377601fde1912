//! Quote records and the remote item shape they are reconciled against.

use serde::{Deserialize, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

/// Category assigned to quotes that arrive without one.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Author shown for quotes that were saved without one.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// A single stored quote with its sync metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Locally generated identifier, stable for the record's lifetime.
    pub local_id: String,
    /// Identifier on the remote endpoint, once the record is known there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<u64>,
    pub text: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Last local modification, in milliseconds since Unix epoch.
    pub updated_at: u64,
}

impl Quote {
    /// Create a local-only quote with a fresh local id.
    ///
    /// `text` is stored as given; callers validate it. A blank category
    /// becomes [`UNCATEGORIZED`].
    pub fn new(text: impl Into<String>, category: Option<&str>, now: u64) -> Self {
        Self {
            local_id: new_local_id(),
            remote_id: None,
            text: text.into(),
            category: normalize_category(category),
            author: None,
            updated_at: now,
        }
    }

    /// Create a local record mirroring a remote item never seen before.
    pub fn from_remote(item: &RemoteItem, now: u64) -> Self {
        Self {
            local_id: new_local_id(),
            remote_id: Some(item.remote_id),
            text: item.text.clone(),
            category: normalize_category(Some(&item.category)),
            author: None,
            updated_at: now,
        }
    }

    /// Whether text and category agree with the remote version.
    pub fn matches_remote(&self, item: &RemoteItem) -> bool {
        self.text == item.text && self.category == normalize_category(Some(&item.category))
    }

    /// Author for display purposes.
    pub fn author_or_unknown(&self) -> &str {
        self.author.as_deref().unwrap_or(UNKNOWN_AUTHOR)
    }
}

/// A record as returned by the remote endpoint, after field mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    pub remote_id: u64,
    pub text: String,
    pub category: String,
}

impl RemoteItem {
    pub fn new(remote_id: u64, text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            remote_id,
            text: text.into(),
            category: category.into(),
        }
    }
}

/// Which quotes a listing or random pick draws from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Category(String),
}

impl CategoryFilter {
    /// Label used for the "no filter" option and its persisted form.
    pub const ALL_LABEL: &'static str = "All";

    /// Parse a persisted or user-entered filter value.
    ///
    /// `All` and blank input mean no filter.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value == Self::ALL_LABEL {
            Self::All
        } else {
            Self::Category(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::All => Self::ALL_LABEL,
            Self::Category(name) => name,
        }
    }

    pub fn matches(&self, quote: &Quote) -> bool {
        match self {
            Self::All => true,
            Self::Category(name) => quote.category == *name,
        }
    }
}

/// Trim a category, substituting [`UNCATEGORIZED`] for missing or blank values.
pub fn normalize_category(category: Option<&str>) -> String {
    match category.map(str::trim) {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => UNCATEGORIZED.to_string(),
    }
}

/// Generate a fresh local id.
pub fn new_local_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current wall-clock time in milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_category_becomes_uncategorized() {
        assert_eq!(normalize_category(None), UNCATEGORIZED);
        assert_eq!(normalize_category(Some("   ")), UNCATEGORIZED);
        assert_eq!(normalize_category(Some(" Wisdom ")), "Wisdom");
    }

    #[test]
    fn test_quote_serializes_camel_case() {
        let mut quote = Quote::new("Stay hungry.", Some("Motivation"), 42);
        quote.remote_id = Some(3);

        let json = serde_json::to_string(&quote).unwrap();
        assert!(json.contains("\"localId\":"));
        assert!(json.contains("\"remoteId\":3"));
        assert!(json.contains("\"updatedAt\":42"));
        assert!(!json.contains("author"));
    }

    #[test]
    fn test_fresh_local_ids_differ() {
        let a = Quote::new("a", None, 0);
        let b = Quote::new("b", None, 0);
        assert_ne!(a.local_id, b.local_id);
    }

    #[test]
    fn test_category_filter_parse() {
        assert_eq!(CategoryFilter::parse("All"), CategoryFilter::All);
        assert_eq!(CategoryFilter::parse(""), CategoryFilter::All);
        assert_eq!(
            CategoryFilter::parse("Humor"),
            CategoryFilter::Category("Humor".into())
        );
        assert_eq!(CategoryFilter::parse("Humor").as_str(), "Humor");
    }

    #[test]
    fn test_matches_remote_compares_text_and_category() {
        let quote = Quote::new("X", Some("C"), 0);
        assert!(quote.matches_remote(&RemoteItem::new(1, "X", "C")));
        assert!(!quote.matches_remote(&RemoteItem::new(1, "Y", "C")));
        assert!(!quote.matches_remote(&RemoteItem::new(1, "X", "D")));
    }
}
