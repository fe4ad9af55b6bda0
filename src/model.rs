use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::DuplicateRecord;

/// Provider-assigned identifier of a search result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(Arc<str>);

impl RecordId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque payload carried alongside a record; compared by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentToken(Arc<str>);

impl ContentToken {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One search result. Cheap to clone; equality and hashing use only the id.
#[derive(Debug, Clone)]
pub struct Record {
    id: RecordId,
    artwork: Arc<str>,
    content: ContentToken,
}

impl Record {
    pub fn new(id: RecordId, artwork: impl Into<Arc<str>>, content: ContentToken) -> Self {
        Self {
            id,
            artwork: artwork.into(),
            content,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn artwork(&self) -> &str {
        &self.artwork
    }

    pub fn content(&self) -> &ContentToken {
        &self.content
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Ordered, immutable snapshot of one fetch. Identifiers are unique.
#[derive(Debug, Clone)]
pub struct ResultSet {
    records: Arc<[Record]>,
}

impl ResultSet {
    pub fn new(records: Vec<Record>) -> Result<Self, DuplicateRecord> {
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.id()) {
                return Err(DuplicateRecord(record.id().clone()));
            }
        }
        Ok(Self {
            records: records.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

#[cfg(test)]
pub(crate) fn test_record(n: usize) -> Record {
    Record::new(
        RecordId::new(format!("id-{n}")),
        format!("https://art.example/{n}.jpg"),
        ContentToken::new(format!("{{\"trackId\":{n}}}")),
    )
}

#[cfg(test)]
pub(crate) fn test_result_set(count: usize) -> ResultSet {
    ResultSet::new((0..count).map(test_record).collect()).expect("unique ids")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_compare_by_identifier_only() {
        let a = Record::new(RecordId::new("1"), "a.jpg", ContentToken::new("x"));
        let b = Record::new(RecordId::new("1"), "b.jpg", ContentToken::new("y"));
        let c = Record::new(RecordId::new("2"), "a.jpg", ContentToken::new("x"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn result_set_rejects_duplicate_identifiers() {
        let err = ResultSet::new(vec![test_record(1), test_record(2), test_record(1)])
            .expect_err("duplicate must be rejected");
        assert_eq!(err.0, RecordId::new("id-1"));
    }

    #[test]
    fn result_set_keeps_received_order() {
        let set = test_result_set(5);
        let ids: Vec<&str> = set.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, ["id-0", "id-1", "id-2", "id-3", "id-4"]);
    }
}
