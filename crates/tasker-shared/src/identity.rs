//! Identity hash strategy (SPEC_FULL.md §3 / §1 "out of scope: identity-hash
//! strategies"). The trait is the contracted interface; `Sha256FieldHashStrategy`
//! is the one strategy this repository ships.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// A stable hash over caller-designated task fields, used to dedupe
/// equivalent submissions (§3 invariant 6).
pub trait IdentityHashStrategy: Send + Sync {
    fn hash(&self, fields: &[(&str, Option<&Value>)]) -> String;
}

/// Hashes the ordered, JSON-canonicalized field values with SHA-256. Two
/// submissions with identical `identity_fields` values produce the same hash
/// regardless of map key ordering, since `serde_json::Value` equality (and
/// its `to_string` for object keys under `preserve_order` off) is used as the
/// canonical form.
#[derive(Debug, Clone, Default)]
pub struct Sha256FieldHashStrategy;

impl IdentityHashStrategy for Sha256FieldHashStrategy {
    fn hash(&self, fields: &[(&str, Option<&Value>)]) -> String {
        let mut hasher = Sha256::new();
        for (name, value) in fields {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            match value {
                Some(v) => hasher.update(v.to_string().as_bytes()),
                None => hasher.update(b"null"),
            }
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}
