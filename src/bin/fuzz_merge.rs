//! AFL fuzz harness for the merge engine.
//!
//! Each user has a replica and edits it locally by cursor position. Edits
//! are delivered to other replicas out of order (newest first) and more
//! than once. After a full exchange every replica must hold the same text
//! and fingerprint, with nothing left parked.

use afl::fuzz;
use stitch::Document;
use stitch::Operation;
use stitch::RawOperation;
use stitch::crdt::primitives::DocId;
use stitch::crdt::validate::Validator;

const NUM_USERS: usize = 3;
const DOC: &str = "fuzz";

#[derive(Debug, Clone, Copy)]
enum FuzzOp {
    /// User types a character at a position in their replica
    Insert { user: u8, pos_frac: u8, ch: u8 },
    /// User deletes the character at a position
    Delete { user: u8, pos_frac: u8 },
    /// User `to` receives everything user `from` wrote, newest first
    Broadcast { from: u8, to: u8 },
    /// Everyone receives everything
    FullSync,
}

impl FuzzOp {
    fn from_bytes(bytes: &[u8]) -> Option<(FuzzOp, &[u8])> {
        let (&tag, rest) = bytes.split_first()?;
        return match tag % 4 {
            0 if rest.len() >= 3 => Some((
                FuzzOp::Insert {
                    user: rest[0] % NUM_USERS as u8,
                    pos_frac: rest[1],
                    ch: rest[2],
                },
                &rest[3..],
            )),
            1 if rest.len() >= 2 => Some((
                FuzzOp::Delete {
                    user: rest[0] % NUM_USERS as u8,
                    pos_frac: rest[1],
                },
                &rest[2..],
            )),
            2 if rest.len() >= 2 => Some((
                FuzzOp::Broadcast {
                    from: rest[0] % NUM_USERS as u8,
                    to: rest[1] % NUM_USERS as u8,
                },
                &rest[2..],
            )),
            3 => Some((FuzzOp::FullSync, rest)),
            _ => None,
        };
    }
}

struct Replica {
    doc: Document,
    /// Operations this user authored, oldest first.
    authored: Vec<Operation>,
}

impl Replica {
    fn author(&mut self, validator: &Validator, raw: RawOperation) {
        let op = validator.validate(DOC, &raw).expect("generated operation is well-formed");
        self.doc.apply(op.clone()).expect("local edit is admissible");
        self.authored.push(op);
    }
}

fn position(pos_frac: u8, len: usize) -> usize {
    return (pos_frac as usize * len) / 256;
}

fn deliver(replicas: &mut [Replica], from: usize, to: usize) {
    let ops: Vec<Operation> = replicas[from].authored.iter().rev().cloned().collect();
    for op in ops {
        replicas[to].doc.apply(op).expect("delivered operation is admissible");
    }
}

fn full_sync(replicas: &mut [Replica]) {
    for to in 0..NUM_USERS {
        for from in 0..NUM_USERS {
            deliver(replicas, from, to);
        }
    }
    let text = replicas[0].doc.text();
    let fingerprint = replicas[0].doc.fingerprint();
    for (i, replica) in replicas.iter().enumerate().skip(1) {
        assert_eq!(replica.doc.text(), text, "Convergence failure! User {} != User 0", i);
        assert_eq!(replica.doc.fingerprint(), fingerprint, "Fingerprint mismatch at user {}", i);
    }
    for replica in replicas.iter() {
        assert_eq!(replica.doc.pending_len(), 0, "Operations left parked after full sync");
        assert_eq!(replica.doc.chars().count(), replica.doc.len(), "Length mismatch");
    }
}

fn main() {
    let validator = Validator::default();

    fuzz!(|data: &[u8]| {
        let mut replicas: Vec<Replica> = (0..NUM_USERS)
            .map(|_| Replica {
                doc: Document::new(DocId::new(DOC)),
                authored: Vec::new(),
            })
            .collect();
        let mut seq = 0u32;
        let mut remaining = data;

        while let Some((op, rest)) = FuzzOp::from_bytes(remaining) {
            remaining = rest;
            seq += 1;

            match op {
                FuzzOp::Insert { user, pos_frac, ch } => {
                    let replica = &mut replicas[user as usize];
                    let pos = position(pos_frac, replica.doc.len() + 1);
                    let after = match pos {
                        0 => "root".to_string(),
                        _ => replica.doc.id_at(pos - 1).map(|id| id.to_string()).expect("position in range"),
                    };
                    let id = format!("u{}-{}", user, seq);
                    let client = format!("user{}", user);
                    let ch = char::from(b'a' + ch % 26);
                    replica.author(&validator, RawOperation::insert(&id, DOC, &client, ch, &after));
                }

                FuzzOp::Delete { user, pos_frac } => {
                    let replica = &mut replicas[user as usize];
                    let len = replica.doc.len();
                    if len > 0 {
                        let target = replica.doc.id_at(position(pos_frac, len)).map(|id| id.to_string());
                        if let Some(target) = target {
                            let id = format!("u{}-{}", user, seq);
                            let client = format!("user{}", user);
                            replica.author(&validator, RawOperation::delete(&id, DOC, &client, &target));
                        }
                    }
                }

                FuzzOp::Broadcast { from, to } => {
                    if from != to {
                        deliver(&mut replicas, from as usize, to as usize);
                    }
                }

                FuzzOp::FullSync => full_sync(&mut replicas),
            }
        }

        full_sync(&mut replicas);
    });
}
