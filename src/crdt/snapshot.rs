//! Projection of the tree into visible text.
//!
//! `VisibleChars` is a lazy walk over the tree that skips tombstones. It
//! borrows the tree, so restarting it is just asking for a new one.
//! `Snapshot` is the materialized, owned form that the engine caches and
//! writes to the documents table.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use super::primitives::DocId;
use super::primitives::OpId;
use super::rga::Preorder;
use super::rga::Rga;

/// Lazy iterator over the visible characters of a tree, in document order.
pub struct VisibleChars<'a> {
    rga: &'a Rga,
    walk: Preorder<'a>,
}

impl Iterator for VisibleChars<'_> {
    type Item = char;

    fn next(&mut self) -> Option<char> {
        for idx in self.walk.by_ref() {
            let node = self.rga.node(idx);
            if !node.deleted {
                return Some(node.ch);
            }
        }
        return None;
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        return (0, Some(self.rga.len()));
    }
}

/// Visible characters of `rga`.
pub fn visible_chars(rga: &Rga) -> VisibleChars<'_> {
    return VisibleChars { rga, walk: rga.iter() };
}

/// The materialized text of a document at some version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub doc_id: DocId,
    pub text: String,
    /// Structural version this text was materialized from. Higher is newer.
    pub version: u64,
    /// Number of visible characters.
    pub len: usize,
    pub materialized_at: DateTime<Utc>,
}

impl Snapshot {
    /// A snapshot of a document nothing has been applied to.
    pub fn empty(doc_id: DocId) -> Snapshot {
        return Snapshot {
            doc_id,
            text: String::new(),
            version: 0,
            len: 0,
            materialized_at: Utc::now(),
        };
    }

    pub fn materialize(doc_id: DocId, rga: &Rga, version: u64) -> Snapshot {
        let text: String = visible_chars(rga).collect();
        log::trace!("materialized {} at version {} ({} chars)", doc_id, version, rga.len());
        return Snapshot {
            doc_id,
            text,
            version,
            len: rga.len(),
            materialized_at: Utc::now(),
        };
    }
}

/// One element of the document, tombstones included.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Element {
    pub id: OpId,
    pub ch: char,
    pub visible: bool,
}

/// Every element in document order, tombstones included.
pub fn elements(rga: &Rga) -> Vec<Element> {
    return rga
        .iter()
        .map(|idx| {
            let node = rga.node(idx);
            Element {
                id: node.id.clone(),
                ch: node.ch,
                visible: !node.deleted,
            }
        })
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::primitives::Anchor;
    use crate::crdt::primitives::ClientId;

    fn build() -> Rga {
        let mut rga = Rga::new();
        let alice = ClientId::new("alice");
        rga.apply_insert(&OpId::new("a1"), &alice, 'c', &Anchor::Root).unwrap();
        rga.apply_insert(&OpId::new("a2"), &alice, 'a', &Anchor::parse("a1")).unwrap();
        rga.apply_insert(&OpId::new("a3"), &alice, 't', &Anchor::parse("a2")).unwrap();
        return rga;
    }

    #[test]
    fn skips_tombstones() {
        let mut rga = build();
        let idx = rga.lookup("a2").unwrap();
        rga.mark_deleted(idx);
        assert_eq!(visible_chars(&rga).collect::<String>(), "ct");
    }

    #[test]
    fn restartable() {
        let rga = build();
        let first: String = visible_chars(&rga).collect();
        let second: String = visible_chars(&rga).collect();
        assert_eq!(first, second);
        assert_eq!(visible_chars(&rga).nth(1), Some('a'));
    }

    #[test]
    fn snapshot_carries_version_and_len() {
        let rga = build();
        let snapshot = Snapshot::materialize(DocId::new("doc"), &rga, 7);
        assert_eq!(snapshot.text, "cat");
        assert_eq!(snapshot.len, 3);
        assert_eq!(snapshot.version, 7);

        let empty = Snapshot::empty(DocId::new("doc"));
        assert_eq!(empty.text, "");
        assert_eq!(empty.version, 0);
    }

    #[test]
    fn elements_include_tombstones() {
        let mut rga = build();
        let idx = rga.lookup("a1").unwrap();
        rga.mark_deleted(idx);
        let elements = elements(&rga);
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0], Element { id: OpId::new("a1"), ch: 'c', visible: false });
        assert!(elements[1].visible);
    }

    #[test]
    fn snapshot_serializes() {
        let snapshot = Snapshot::materialize(DocId::new("doc"), &build(), 1);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["doc_id"], "doc");
        assert_eq!(json["text"], "cat");
    }
}
