//! Local store of immutable and mutable items.

use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::{debug, warn};

use crate::common::{Id, StorageItem};

/// Default maximum number of items to store.
pub const MAX_VALUES: usize = 1000;
/// Maximum size of an item's value in bytes.
pub const MAX_VALUE_SIZE: usize = 1000;
/// Maximum size of a mutable item's salt in bytes.
pub const MAX_SALT_SIZE: usize = 64;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Why an item was refused by a store.
pub enum StorageError {
    #[error("Invalid signature")]
    InvalidSignature,

    /// Sequence number not greater than the stored one.
    #[error("Sequence number less than current")]
    Stale,

    #[error("Target doesn't match the item")]
    TargetMismatch,

    #[error("Value too big")]
    ValueTooLarge,

    #[error("Salt too big")]
    SaltTooLarge,

    /// A mutable item over an immutable one, or the reverse.
    #[error("Conflicting item kind at target")]
    Conflict,
}

impl StorageError {
    /// KRPC error code sent to remote writers.
    pub fn code(&self) -> i32 {
        match self {
            StorageError::Conflict => 201,
            StorageError::TargetMismatch => 203,
            StorageError::ValueTooLarge => 205,
            StorageError::InvalidSignature => 206,
            StorageError::SaltTooLarge => 207,
            StorageError::Stale => 302,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// First item at this target.
    Stored,
    /// A mutable item replaced by a more recent one.
    Updated,
    /// Same item already stored, or an immutable collision where the first value wins.
    Unchanged,
}

#[derive(Debug)]
/// Bounded store, dropping the least recently used items first.
pub struct Storage {
    items: LruCache<Id, StorageItem>,
}

impl Storage {
    pub fn new(max_values: usize) -> Self {
        let capacity = NonZeroUsize::new(max_values)
            .or(NonZeroUsize::new(MAX_VALUES))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            items: LruCache::new(capacity),
        }
    }

    // === Getters ===

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn lookup(&self, target: &Id) -> Option<&StorageItem> {
        self.items.peek(target)
    }

    // === Public Methods ===

    /// Insert an item, see [StoreOutcome] and [StorageError].
    pub fn insert(&mut self, item: StorageItem) -> Result<StoreOutcome, StorageError> {
        check_limits(&item)?;

        let target = *item.target();

        let outcome = match (self.items.get(&target), &item) {
            (None, StorageItem::Immutable(_)) => StoreOutcome::Stored,
            (None, StorageItem::Mutable(mutable)) => {
                mutable
                    .verify()
                    .map_err(|_| StorageError::InvalidSignature)?;

                StoreOutcome::Stored
            }
            (Some(StorageItem::Immutable(stored)), StorageItem::Immutable(incoming)) => {
                if stored.value() != incoming.value() {
                    warn!(?target, "Immutable item collision, keeping the first value");
                }

                return Ok(StoreOutcome::Unchanged);
            }
            (Some(StorageItem::Mutable(stored)), StorageItem::Mutable(incoming)) => {
                if stored == incoming {
                    return Ok(StoreOutcome::Unchanged);
                }

                if incoming.seq() <= stored.seq() {
                    debug!(
                        ?target,
                        stored = stored.seq(),
                        incoming = incoming.seq(),
                        "Rejected stale mutable item"
                    );

                    return Err(StorageError::Stale);
                }

                if incoming.key() != stored.key() {
                    return Err(StorageError::InvalidSignature);
                }

                incoming
                    .verify()
                    .map_err(|_| StorageError::InvalidSignature)?;

                StoreOutcome::Updated
            }
            (Some(_), _) => return Err(StorageError::Conflict),
        };

        self.items.put(target, item);

        Ok(outcome)
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new(MAX_VALUES)
    }
}

/// Size limits shared by local inserts and incoming `put` requests.
pub fn check_limits(item: &StorageItem) -> Result<(), StorageError> {
    if item.value().len() > MAX_VALUE_SIZE {
        return Err(StorageError::ValueTooLarge);
    }

    if let StorageItem::Mutable(mutable) = item {
        if mutable.salt().map(|salt| salt.len()).unwrap_or(0) > MAX_SALT_SIZE {
            return Err(StorageError::SaltTooLarge);
        }
    }

    Ok(())
}
