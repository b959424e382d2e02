//! Deterministic ordering of concurrent inserts.
//!
//! When two inserts are anchored after the same element, neither "happened
//! first" in any sense every replica can agree on. Instead siblings are
//! ordered by a key derived from immutable operation content: the client id,
//! then the op id, both ascending. Every replica computes the same key for
//! the same operation, so once the same children are known their order is
//! identical everywhere, whatever order they arrived in.
//!
//! A newly learned child is placed at its sorted position among the
//! existing ones. This can shift the visible index of later text, but never
//! changes the relative order of two siblings that were already known.

use std::cmp::Ordering;

use super::primitives::ClientId;
use super::primitives::OpId;

/// The sort key of a child among its siblings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SiblingKey<'a> {
    pub client: &'a ClientId,
    pub op: &'a OpId,
}

impl<'a> SiblingKey<'a> {
    pub fn new(client: &'a ClientId, op: &'a OpId) -> SiblingKey<'a> {
        return SiblingKey { client, op };
    }
}

impl PartialOrd for SiblingKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for SiblingKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Compare by client first, then by op id
        match self.client.cmp(other.client) {
            Ordering::Equal => self.op.cmp(other.op),
            other => other,
        }
    }
}

/// Find where a child with `key` belongs among `siblings`.
///
/// `siblings` must already be sorted under `key_of`. Returns `Ok(i)` if a
/// sibling with an equal key is at `i`, otherwise `Err(i)` with the index
/// to insert at.
pub fn place<'a, T: Copy>(
    siblings: &[T],
    key: SiblingKey<'a>,
    key_of: impl Fn(T) -> SiblingKey<'a>,
) -> Result<usize, usize> {
    return siblings.binary_search_by(|&sibling| key_of(sibling).cmp(&key));
}
