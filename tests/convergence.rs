//! Property-based convergence tests.
//!
//! Histories are produced by simulated clients that edit their own replica
//! by cursor position and occasionally sync, so the operation sets contain
//! real concurrency: inserts racing at one anchor, inserts after
//! concurrently deleted characters, and concurrent deletes of one element.

use proptest::prelude::*;
use proptest::sample::Index;
use stitch::Document;
use stitch::Engine;
use stitch::RawOperation;
use stitch::crdt::primitives::DocId;
use stitch::crdt::validate::Validator;

const DOC: &str = "doc";
const CLIENTS: usize = 3;

// =============================================================================
// Test helpers
// =============================================================================

#[derive(Clone, Debug)]
enum Step {
    Insert { client: usize, pos_frac: u8, ch: char },
    Delete { client: usize, pos_frac: u8 },
    Sync { from: usize, to: usize },
}

fn arbitrary_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..CLIENTS, any::<u8>(), prop::char::range('a', 'z'))
            .prop_map(|(client, pos_frac, ch)| Step::Insert { client, pos_frac, ch }),
        2 => (0..CLIENTS, any::<u8>()).prop_map(|(client, pos_frac)| Step::Delete { client, pos_frac }),
        1 => (0..CLIENTS, 0..CLIENTS).prop_map(|(from, to)| Step::Sync { from, to }),
    ]
}

fn new_doc() -> Document {
    return Document::new(DocId::new(DOC));
}

fn apply_raw(doc: &mut Document, raw: &RawOperation) {
    let op = Validator::default().validate(DOC, raw).unwrap();
    doc.apply(op).unwrap();
}

/// Run the script and return every authored operation, in authoring order.
fn author(script: &[Step]) -> Vec<RawOperation> {
    let mut replicas: Vec<Document> = (0..CLIENTS).map(|_| new_doc()).collect();
    let mut authored: Vec<Vec<RawOperation>> = vec![Vec::new(); CLIENTS];
    let mut all = Vec::new();

    for (seq, step) in script.iter().enumerate() {
        let raw = match step {
            Step::Insert { client, pos_frac, ch } => {
                let doc = &replicas[*client];
                let pos = (*pos_frac as usize * (doc.len() + 1)) / 256;
                let after = match pos {
                    0 => "root".to_string(),
                    _ => doc.id_at(pos - 1).unwrap().to_string(),
                };
                let id = format!("c{}-{:04}", client, seq);
                Some((*client, RawOperation::insert(&id, DOC, &format!("client{}", client), *ch, &after)))
            }
            Step::Delete { client, pos_frac } => {
                let doc = &replicas[*client];
                if doc.is_empty() {
                    None
                } else {
                    let target = doc.id_at((*pos_frac as usize * doc.len()) / 256).unwrap().to_string();
                    let id = format!("c{}-{:04}", client, seq);
                    Some((*client, RawOperation::delete(&id, DOC, &format!("client{}", client), &target)))
                }
            }
            Step::Sync { from, to } => {
                for raw in authored[*from].clone() {
                    apply_raw(&mut replicas[*to], &raw);
                }
                None
            }
        };
        if let Some((client, raw)) = raw {
            apply_raw(&mut replicas[client], &raw);
            authored[client].push(raw.clone());
            all.push(raw);
        }
    }
    return all;
}

fn replay(ops: &[RawOperation]) -> Document {
    let mut doc = new_doc();
    for raw in ops {
        apply_raw(&mut doc, raw);
    }
    return doc;
}

/// A history, a permutation of it, and some duplicate deliveries.
fn history() -> impl Strategy<Value = (Vec<RawOperation>, Vec<RawOperation>, Vec<(Index, Index)>)> {
    return prop::collection::vec(arbitrary_step(), 1..60).prop_flat_map(|script| {
        let ops = author(&script);
        (
            Just(ops.clone()),
            Just(ops).prop_shuffle(),
            prop::collection::vec((any::<Index>(), any::<Index>()), 0..10),
        )
    });
}

fn with_duplicates(ops: &[RawOperation], dups: &[(Index, Index)]) -> Vec<RawOperation> {
    let mut delivered = ops.to_vec();
    if ops.is_empty() {
        return delivered;
    }
    for (which, at) in dups {
        let op = ops[which.index(ops.len())].clone();
        let at = at.index(delivered.len() + 1);
        delivered.insert(at, op);
    }
    return delivered;
}

// =============================================================================
// Convergence properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Any delivery order, with duplicates, yields the same document.
    #[test]
    fn any_order_converges((causal, shuffled, dups) in history()) {
        let expected = replay(&causal);
        let delivered = with_duplicates(&shuffled, &dups);
        let actual = replay(&delivered);

        prop_assert_eq!(actual.text(), expected.text());
        prop_assert_eq!(actual.fingerprint(), expected.fingerprint());
        prop_assert_eq!(actual.elements(), expected.elements());
        prop_assert_eq!(actual.pending_len(), 0);
    }

    /// Applying everything twice is the same as applying it once.
    #[test]
    fn idempotent((causal, shuffled, _dups) in history()) {
        let once = replay(&shuffled);
        let mut twice = shuffled.clone();
        twice.extend(causal.iter().cloned());
        let twice = replay(&twice);

        prop_assert_eq!(twice.text(), once.text());
        prop_assert_eq!(twice.version(), once.version());
        prop_assert_eq!(twice.fingerprint(), once.fingerprint());
    }

    /// The engine's live snapshot equals a replay of its stored log.
    #[test]
    fn live_snapshot_matches_replay((_causal, shuffled, dups) in history()) {
        let engine = Engine::new();
        for raw in with_duplicates(&shuffled, &dups) {
            engine.append_operation(DOC, &raw).unwrap();
        }
        let live = engine.text(DOC).unwrap();
        let log = engine.store().rows(&DocId::new(DOC));
        prop_assert_eq!(log.len(), shuffled.len());
        prop_assert_eq!(engine.replay(DOC, &log), live);
    }

    /// Only visible characters are reported, and position lookups agree
    /// with the text.
    #[test]
    fn positions_match_text((causal, _shuffled, _dups) in history()) {
        let doc = replay(&causal);
        let text: Vec<char> = doc.text().chars().collect();
        prop_assert_eq!(text.len(), doc.len());
        for (i, element) in doc.elements().iter().filter(|e| e.visible).enumerate() {
            prop_assert_eq!(text[i], element.ch);
            prop_assert_eq!(doc.position_of(element.id.as_str()), Some(i));
            prop_assert_eq!(doc.id_at(i), Some(&element.id));
        }
    }
}
