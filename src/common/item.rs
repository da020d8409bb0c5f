//! Items that can be stored in, and distributed across, the DHT.

use bytes::Bytes;

use crate::common::{Id, ImmutableItem, MutableError, MutableItem};

#[derive(Clone, Debug, PartialEq, Eq)]
/// Either a content addressed [ImmutableItem] or a signed [MutableItem].
pub enum StorageItem {
    Immutable(ImmutableItem),
    Mutable(MutableItem),
}

impl StorageItem {
    /// Create an immutable item, its target is the hash of `value`.
    pub fn immutable(value: impl Into<Bytes>) -> Self {
        StorageItem::Immutable(ImmutableItem::new(value))
    }

    /// Create a mutable item from an existing signature, failing if it doesn't verify.
    pub fn mutable(
        value: impl Into<Bytes>,
        public_key: &[u8],
        salt: Option<Bytes>,
        seq: i64,
        signature: &[u8],
    ) -> Result<Self, MutableError> {
        MutableItem::from_signed(public_key, signature, value, seq, salt).map(StorageItem::Mutable)
    }

    // === Getters ===

    pub fn target(&self) -> &Id {
        match self {
            StorageItem::Immutable(item) => item.target(),
            StorageItem::Mutable(item) => item.target(),
        }
    }

    pub fn value(&self) -> &Bytes {
        match self {
            StorageItem::Immutable(item) => item.value(),
            StorageItem::Mutable(item) => item.value(),
        }
    }

    /// Sequence number of a mutable item.
    pub fn seq(&self) -> Option<i64> {
        match self {
            StorageItem::Immutable(_) => None,
            StorageItem::Mutable(item) => Some(item.seq()),
        }
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self, StorageItem::Mutable(_))
    }

    pub fn as_mutable(&self) -> Option<&MutableItem> {
        match self {
            StorageItem::Mutable(item) => Some(item),
            StorageItem::Immutable(_) => None,
        }
    }
}

impl From<ImmutableItem> for StorageItem {
    fn from(item: ImmutableItem) -> Self {
        StorageItem::Immutable(item)
    }
}

impl From<MutableItem> for StorageItem {
    fn from(item: MutableItem) -> Self {
        StorageItem::Mutable(item)
    }
}
