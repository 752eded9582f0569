use crate::models::VisitorId;
use std::collections::HashMap;

/// Where a visitor's current pair sits in the roster, and the one nonce that
/// is allowed to vote on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StickinessEntry {
    pub offset: usize,
    pub nonce: String,
}

/// Visitor -> pair they were last given and have not voted on yet
#[derive(Debug, Default)]
pub struct StickinessTable {
    entries: HashMap<VisitorId, StickinessEntry>,
}

impl StickinessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, visitor: &VisitorId) -> Option<&StickinessEntry> {
        self.entries.get(visitor)
    }

    /// Point the visitor at `offset`, returning the entry it replaces
    pub fn record(
        &mut self,
        visitor: VisitorId,
        offset: usize,
        nonce: String,
    ) -> Option<StickinessEntry> {
        self.entries.insert(visitor, StickinessEntry { offset, nonce })
    }

    pub fn remove(&mut self, visitor: &VisitorId) -> Option<StickinessEntry> {
        self.entries.remove(visitor)
    }

    /// Remove the visitor's entry only if it still points at `offset`
    pub fn release(&mut self, visitor: &VisitorId, offset: usize) -> bool {
        match self.entries.get(visitor) {
            Some(entry) if entry.offset == offset => {
                self.entries.remove(visitor);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
