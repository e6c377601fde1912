//! QuoteCollection: the in-memory ordered list of quotes for a session.
//!
//! Every public mutating operation persists the full list to the backing
//! [`KeyValueStore`] before returning. Persistence failures are logged and
//! swallowed; the in-memory list stays authoritative.

use crate::quote::{normalize_category, now_millis, new_local_id, CategoryFilter, Quote};
use crate::store::{KeyValueStore, QUOTES_KEY};

use rand::seq::IndexedRandom;
use serde_json::Value;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Quote text must not be empty")]
    EmptyText,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected a JSON array of quotes or a single quote object")]
    UnexpectedShape,
}

/// Quotes shipped with a fresh install.
const SAMPLE_QUOTES: &[(&str, &str, &str)] = &[
    ("Imagination is more important than knowledge.", "Albert Einstein", "Inspiration"),
    (
        "The future belongs to those who believe in the beauty of their dreams.",
        "Eleanor Roosevelt",
        "Inspiration",
    ),
    ("Simplicity is the soul of efficiency.", "Austin Freeman", "Productivity"),
    (
        "The only limit to our realization of tomorrow is our doubts of today.",
        "Franklin D. Roosevelt",
        "Motivation",
    ),
    ("Quality is not an act, it is a habit.", "Aristotle", "Philosophy"),
];

/// Lenient shape accepted from storage and import files.
///
/// Every field is optional and read field by field, so one oddly typed
/// field never costs the whole record.
#[derive(Debug, Default)]
struct LooseQuote {
    local_id: Option<String>,
    remote_id: Option<u64>,
    text: Option<String>,
    category: Option<String>,
    author: Option<String>,
    updated_at: Option<u64>,
}

impl LooseQuote {
    /// Read a record from a JSON object. Non-objects yield `None`.
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let field = |name: &str| object.get(name);

        let remote_id = field("remoteId").and_then(|v| {
            let id = v.as_u64();
            if id.is_none() && !v.is_null() {
                debug!("Ignoring unusable remoteId {}, record stays local-only", v);
            }
            id
        });

        Some(Self {
            local_id: field("localId").and_then(stringish),
            remote_id,
            text: field("text").and_then(stringish),
            category: field("category").and_then(stringish),
            author: field("author").and_then(stringish),
            updated_at: field("updatedAt").and_then(Value::as_u64),
        })
    }
}

/// Render a scalar JSON value as text.
fn stringish(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a JSON array of quote-like objects (or one bare object).
///
/// Elements that are not objects are skipped.
fn parse_records(json: &str) -> Result<Vec<LooseQuote>, ParseError> {
    let items = match serde_json::from_str::<Value>(json)? {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        _ => return Err(ParseError::UnexpectedShape),
    };

    Ok(items
        .iter()
        .filter_map(|item| {
            let record = LooseQuote::from_value(item);
            if record.is_none() {
                debug!("Skipping non-object quote record: {}", item);
            }
            record
        })
        .collect())
}

/// Trim optional free text, mapping blank values to `None`.
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Ordered quote list backed by a key-value store.
pub struct QuoteCollection<S: KeyValueStore> {
    pub(crate) quotes: Vec<Quote>,
    store: S,
}

impl<S: KeyValueStore> QuoteCollection<S> {
    /// Create an empty collection without reading the store.
    pub fn new(store: S) -> Self {
        Self {
            quotes: Vec::new(),
            store,
        }
    }

    /// Load the collection from the store.
    ///
    /// A missing slot seeds the sample quotes. A malformed slot is discarded
    /// and reseeded. Stored records are repaired: blank text is dropped,
    /// missing or duplicate ids are reassigned.
    pub fn load(store: S) -> Self {
        let mut collection = Self::new(store);

        let raw = match collection.store.get(QUOTES_KEY) {
            Ok(raw) => raw,
            Err(e) => {
                // Leave the slot alone so a transient failure can't wipe it.
                warn!("Failed to read stored quotes, starting empty: {}", e);
                return collection;
            }
        };

        match raw.as_deref().map(parse_records) {
            Some(Ok(records)) => {
                let now = now_millis();
                let total = records.len();
                let admitted = records
                    .into_iter()
                    .filter(|record| collection.admit(record, now))
                    .count();
                if admitted < total {
                    warn!("Dropped {} stored quote(s) without text", total - admitted);
                }
                info!("Loaded {} quote(s)", admitted);
            }
            Some(Err(e)) => {
                warn!("Stored quotes are malformed, reseeding samples: {}", e);
                if let Err(e) = collection.store.remove(QUOTES_KEY) {
                    warn!("Failed to clear malformed quotes: {}", e);
                }
                collection.seed_samples();
            }
            None => {
                info!("No stored quotes, seeding samples");
                collection.seed_samples();
            }
        }

        collection.persist();
        collection
    }

    fn seed_samples(&mut self) {
        let now = now_millis();
        for (text, author, category) in SAMPLE_QUOTES {
            let mut quote = Quote::new(*text, Some(*category), now);
            quote.author = Some(author.to_string());
            self.quotes.push(quote);
        }
    }

    /// Append a loosely-shaped record, enforcing the collection invariants.
    ///
    /// Returns false when the record has no usable text.
    fn admit(&mut self, record: &LooseQuote, now: u64) -> bool {
        let Some(text) = non_blank(record.text.as_deref()) else {
            return false;
        };

        let local_id = match non_blank(record.local_id.as_deref()) {
            Some(id) if self.find_by_local_id(&id).is_none() => id,
            Some(id) => {
                debug!("Local id {} already in use, assigning a fresh one", id);
                new_local_id()
            }
            None => new_local_id(),
        };

        let remote_id = match record.remote_id {
            Some(id) if self.find_by_remote_id(id).is_some() => {
                debug!("Remote id {} already linked, importing as local-only", id);
                None
            }
            other => other,
        };

        self.quotes.push(Quote {
            local_id,
            remote_id,
            text,
            category: normalize_category(record.category.as_deref()),
            author: non_blank(record.author.as_deref()),
            updated_at: record.updated_at.unwrap_or(now),
        });
        true
    }

    /// Write the full list to the store. Failures are logged only.
    pub fn persist(&self) {
        let json = match serde_json::to_string(&self.quotes) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize quotes: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(QUOTES_KEY, &json) {
            warn!("Failed to persist quotes: {}", e);
        }
    }

    /// Add a new local-only quote.
    pub fn add(&mut self, text: &str, category: Option<&str>) -> Result<Quote, ValidationError> {
        self.add_with_author(text, category, None)
    }

    /// Add a new local-only quote with an optional author.
    pub fn add_with_author(
        &mut self,
        text: &str,
        category: Option<&str>,
        author: Option<&str>,
    ) -> Result<Quote, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }

        let mut quote = Quote::new(text, category, now_millis());
        quote.author = non_blank(author);
        self.quotes.push(quote.clone());
        self.persist();

        debug!("Added quote {} ({})", quote.local_id, quote.category);
        Ok(quote)
    }

    /// Remove a quote by local id, returning it if it existed.
    pub fn remove(&mut self, local_id: &str) -> Option<Quote> {
        let index = self.quotes.iter().position(|q| q.local_id == local_id)?;
        let removed = self.quotes.remove(index);
        self.persist();
        Some(removed)
    }

    pub fn find_by_local_id(&self, local_id: &str) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.local_id == local_id)
    }

    pub fn find_by_remote_id(&self, remote_id: u64) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.remote_id == Some(remote_id))
    }

    pub(crate) fn find_by_local_id_mut(&mut self, local_id: &str) -> Option<&mut Quote> {
        self.quotes.iter_mut().find(|q| q.local_id == local_id)
    }

    /// All quotes in insertion order.
    pub fn all(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Distinct categories, sorted.
    pub fn categories(&self) -> Vec<String> {
        self.quotes
            .iter()
            .map(|q| normalize_category(Some(&q.category)))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Quotes matching a category filter, in insertion order.
    pub fn filtered(&self, filter: &CategoryFilter) -> Vec<&Quote> {
        self.quotes.iter().filter(|q| filter.matches(q)).collect()
    }

    /// Pick one quote at random from those matching the filter.
    pub fn random_quote(&self, filter: &CategoryFilter) -> Option<&Quote> {
        self.filtered(filter).choose(&mut rand::rng()).copied()
    }

    /// Serialize every quote as a pretty JSON array.
    pub fn export_json(&self) -> Result<String, ParseError> {
        Ok(serde_json::to_string_pretty(&self.quotes)?)
    }

    /// Append quotes from a JSON export. Never replaces existing quotes.
    ///
    /// Records without text are skipped. Missing categories become
    /// "Uncategorized"; missing or colliding local ids are reassigned; a remote
    /// id already linked to another quote is dropped. Returns how many quotes
    /// were added. On a parse error the collection is unchanged.
    pub fn import_json(&mut self, json: &str) -> Result<usize, ParseError> {
        let records = parse_records(json)?;
        let now = now_millis();

        let imported = records
            .iter()
            .filter(|record| self.admit(record, now))
            .count();

        if imported > 0 {
            self.persist();
        }
        info!(
            "Imported {} quote(s), skipped {}",
            imported,
            records.len() - imported
        );
        Ok(imported)
    }
}
