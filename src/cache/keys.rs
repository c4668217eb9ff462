//! Cache key definitions.
//!
//! Identifiers shared by the caches and the domain events, plus the composite
//! key of the pagination-count cache.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a deck in the system of record.
pub type DeckId = i64;

/// Identifier of a card in the system of record.
pub type CardId = i64;

/// Subset of a deck's cards a paged listing counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    All,
    KnownOnly,
    UnknownOnly,
}

impl FilterMode {
    /// Whether a known/unknown toggle can change counts under this filter.
    pub fn depends_on_progress(self) -> bool {
        !matches!(self, FilterMode::All)
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FilterMode::All => "all",
            FilterMode::KnownOnly => "known_only",
            FilterMode::UnknownOnly => "unknown_only",
        };
        f.write_str(label)
    }
}

/// Key of one cached pagination count.
///
/// Built only through [`CountCacheKey::new`], which normalizes the search text
/// so "no search" always lands on the same slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CountCacheKey {
    deck_id: DeckId,
    search_query: String,
    filter_mode: FilterMode,
}

impl CountCacheKey {
    pub fn new(deck_id: DeckId, search_query: Option<&str>, filter_mode: FilterMode) -> Self {
        Self {
            deck_id,
            search_query: normalize_search(search_query),
            filter_mode,
        }
    }

    pub fn deck_id(&self) -> DeckId {
        self.deck_id
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn filter_mode(&self) -> FilterMode {
        self.filter_mode
    }
}

/// `None` and blank input become `""`; anything else is trimmed.
pub fn normalize_search(search_query: Option<&str>) -> String {
    search_query
        .map(str::trim)
        .filter(|query| !query.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}
