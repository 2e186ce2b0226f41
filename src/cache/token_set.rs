use std::sync::Arc;

use crate::cache::token::TokenRecord;

/// The token records fetched at startup, in the order the source returned them.
///
/// Cheap to clone; all clones share one immutable slice, so the set needs no
/// locking and can never change after it is built.
#[derive(Debug, Clone)]
pub struct TokenSet {
    records: Arc<[TokenRecord]>,
}

impl TokenSet {
    pub fn new(records: Vec<TokenRecord>) -> Self {
        Self {
            records: records.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at index 0; by convention the operator (admin) token.
    pub fn first(&self) -> Option<&TokenRecord> {
        self.records.first()
    }

    /// First record whose description matches exactly. Descriptions are not
    /// unique, so later duplicates are never returned.
    pub fn find_by_description(&self, description: &str) -> Option<&TokenRecord> {
        self.records.iter().find(|r| r.description == description)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenRecord> {
        self.records.iter()
    }
}

impl From<Vec<TokenRecord>> for TokenSet {
    fn from(records: Vec<TokenRecord>) -> Self {
        Self::new(records)
    }
}
