//! Document queries
//!
//! Composable predicates over the document collection: restrict to one
//! owner, search file names and text, sort newest first. Stores evaluate a
//! [`DocumentQuery`] either in memory ([`DocumentQuery::matches`]) or by
//! translating it to SQL.

use std::cmp::Ordering;

use dm_core::traits::Id;

use crate::model::{Document, OwnerRef};

/// A query over documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentQuery {
    owner: Option<OwnerRef>,
    search: Option<String>,
    ordered: bool,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only documents of one owner
    pub fn for_owner(mut self, owner_type: impl Into<String>, owner_id: Id) -> Self {
        self.owner = Some(OwnerRef::new(owner_type, owner_id));
        self
    }

    pub fn for_ref(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Documents whose file name or text contains `search`. Empty is a no-op.
    pub fn filter(mut self, search: impl AsRef<str>) -> Self {
        let search = search.as_ref();
        self.search = (!search.is_empty()).then(|| search.to_string());
        self
    }

    /// Newest first
    pub fn ordered(mut self) -> Self {
        self.ordered = true;
        self
    }

    pub fn owner(&self) -> Option<&OwnerRef> {
        self.owner.as_ref()
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// LIKE pattern for the search term
    pub fn search_pattern(&self) -> Option<String> {
        self.search.as_ref().map(|s| format!("%{}%", s))
    }

    /// Whether a document satisfies the owner and search predicates
    pub fn matches(&self, document: &Document) -> bool {
        if let Some(owner) = &self.owner {
            if !document.belongs_to(owner) {
                return false;
            }
        }

        match self.search_pattern() {
            None => true,
            Some(pattern) => {
                document
                    .original_name()
                    .map_or(false, |name| like(name, &pattern))
                    || document.text.as_deref().map_or(false, |text| like(text, &pattern))
            }
        }
    }

    /// Filter and sort an in-memory collection
    pub fn apply(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = documents
            .into_iter()
            .filter(|d| self.matches(d))
            .collect();

        if self.ordered {
            matched.sort_by(newest_first);
        } else {
            matched.sort_by_key(|d| d.id);
        }

        matched
    }
}

/// Sort by `created_at` descending, then `id` descending
pub fn newest_first(a: &Document, b: &Document) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// SQL `LIKE` matching: `%` is any run of characters, `_` is one character,
/// `\` escapes the next character. Case-sensitive.
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern = tokenize(pattern);

    // matched[i]: pattern prefix so far matches text prefix of length i
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;

    for token in &pattern {
        let mut next = vec![false; text.len() + 1];
        match token {
            LikeToken::AnySequence => {
                let mut reachable = false;
                for i in 0..=text.len() {
                    reachable |= matched[i];
                    next[i] = reachable;
                }
            }
            LikeToken::AnyChar => {
                for i in 0..text.len() {
                    next[i + 1] = matched[i];
                }
            }
            LikeToken::Literal(c) => {
                for i in 0..text.len() {
                    next[i + 1] = matched[i] && text[i] == *c;
                }
            }
        }
        matched = next;
    }

    matched[text.len()]
}

enum LikeToken {
    AnySequence,
    AnyChar,
    Literal(char),
}

fn tokenize(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        let token = match c {
            '%' => LikeToken::AnySequence,
            '_' => LikeToken::AnyChar,
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            c => LikeToken::Literal(c),
        };
        tokens.push(token);
    }

    tokens
}
