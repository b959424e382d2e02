//! Order-independent fingerprint of an operation set.
//!
//! Each operation is hashed with blake3 under a type byte for domain
//! separation, and the hashes are XORed together. XOR is commutative and
//! associative, so two replicas that have observed the same set of
//! operations hold the same fingerprint no matter what order things
//! arrived in. Callers must add each op id at most once; adding the same
//! hash twice cancels it out.

use super::op::OpKind;
use super::op::Operation;

/// Type constant for insert operation hashes.
pub const TYPE_INSERT: u8 = 0x00;

/// Type constant for delete operation hashes.
pub const TYPE_DELETE: u8 = 0x01;

fn update_field(hasher: &mut blake3::Hasher, field: &[u8]) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field);
}

/// Hash the content of an operation. `created_at` is not included.
pub fn hash_operation(op: &Operation) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    match &op.kind {
        OpKind::Insert { ch, anchor } => {
            hasher.update(&[TYPE_INSERT]);
            update_field(&mut hasher, op.id.as_str().as_bytes());
            update_field(&mut hasher, op.doc.as_str().as_bytes());
            update_field(&mut hasher, op.client.as_str().as_bytes());
            hasher.update(&u32::from(*ch).to_le_bytes());
            update_field(&mut hasher, anchor.as_str().as_bytes());
        }
        OpKind::Delete { target } => {
            hasher.update(&[TYPE_DELETE]);
            update_field(&mut hasher, op.id.as_str().as_bytes());
            update_field(&mut hasher, op.doc.as_str().as_bytes());
            update_field(&mut hasher, op.client.as_str().as_bytes());
            update_field(&mut hasher, target.as_str().as_bytes());
        }
    }
    return *hasher.finalize().as_bytes();
}

/// XOR of the hashes of every operation observed.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl Fingerprint {
    /// The fingerprint of the empty set.
    pub fn empty() -> Fingerprint {
        return Fingerprint([0; 32]);
    }

    pub fn add(&mut self, op: &Operation) {
        let hash = hash_operation(op);
        for (byte, other) in self.0.iter_mut().zip(hash.iter()) {
            *byte ^= other;
        }
    }

    pub fn to_hex(&self) -> String {
        return self.0.iter().map(|b| format!("{:02x}", b)).collect();
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "Fingerprint({})", self.to_hex());
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f.write_str(&self.to_hex());
    }
}
