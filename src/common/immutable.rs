//! Content addressed items.

use bytes::Bytes;
use sha1_smol::Sha1;

use crate::common::Id;

/// Target of an immutable value, the SHA-1 of its bencoded string form `<len>:<value>`.
pub fn hash_immutable(value: &[u8]) -> Id {
    let mut encoded = Vec::with_capacity(value.len() + 5);
    encoded.extend(format!("{}:", value.len()).bytes());
    encoded.extend_from_slice(value);

    let mut hasher = Sha1::new();
    hasher.update(&encoded);

    hasher.digest().bytes().into()
}

pub fn validate_immutable(value: &[u8], target: &Id) -> bool {
    &hash_immutable(value) == target
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// A write-once value stored under the hash of its own content.
pub struct ImmutableItem {
    target: Id,
    value: Bytes,
}

impl ImmutableItem {
    pub fn new(value: impl Into<Bytes>) -> Self {
        let value = value.into();

        Self {
            target: hash_immutable(&value),
            value,
        }
    }

    pub fn target(&self) -> &Id {
        &self.target
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }
}
