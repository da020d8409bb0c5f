//! Signed, versioned items addressed by their public key and salt.

use bytes::Bytes;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha1_smol::Sha1;

use crate::common::Id;

#[derive(Clone, Debug, PartialEq, Eq)]
/// [BEP_0044](https://www.bittorrent.org/beps/bep_0044.html)'s Mutable item.
pub struct MutableItem {
    /// hash of the key and optional salt
    target: Id,
    /// ed25519 public key
    key: [u8; 32],
    /// sequence number
    seq: i64,
    /// mutable value
    value: Bytes,
    /// ed25519 signature
    signature: [u8; 64],
    /// Optional salt
    salt: Option<Bytes>,
}

impl MutableItem {
    /// Sign a new mutable item.
    pub fn new(signer: &SigningKey, value: impl Into<Bytes>, seq: i64, salt: Option<Bytes>) -> Self {
        let value = value.into();
        let signature = signer.sign(&encode_signable(seq, &value, salt.as_deref()));

        Self::new_signed_unchecked(
            signer.verifying_key().to_bytes(),
            signature.to_bytes(),
            value,
            seq,
            salt,
        )
    }

    /// Build an item from a received signature, verifying it.
    pub fn from_signed(
        key: &[u8],
        signature: &[u8],
        value: impl Into<Bytes>,
        seq: i64,
        salt: Option<Bytes>,
    ) -> Result<Self, MutableError> {
        let key: [u8; 32] = key
            .try_into()
            .map_err(|_| MutableError::InvalidPublicKey)?;
        let signature: [u8; 64] = signature
            .try_into()
            .map_err(|_| MutableError::InvalidSignature)?;

        let item = Self::new_signed_unchecked(key, signature, value, seq, salt);
        item.verify()?;

        Ok(item)
    }

    /// Build an item without checking its signature, see [MutableItem::verify].
    pub fn new_signed_unchecked(
        key: [u8; 32],
        signature: [u8; 64],
        value: impl Into<Bytes>,
        seq: i64,
        salt: Option<Bytes>,
    ) -> Self {
        Self {
            target: MutableItem::target_from_key(&key, salt.as_deref()),
            key,
            seq,
            value: value.into(),
            signature,
            salt,
        }
    }

    /// Return the target of a [MutableItem] by hashing its `public_key` and an optional `salt`
    pub fn target_from_key(public_key: &[u8; 32], salt: Option<&[u8]>) -> Id {
        let mut hasher = Sha1::new();
        hasher.update(public_key);

        if let Some(salt) = salt {
            hasher.update(salt);
        }

        hasher.digest().bytes().into()
    }

    /// Check the signature over `(salt, seq, value)` under this item's own key.
    pub fn verify(&self) -> Result<(), MutableError> {
        let key =
            VerifyingKey::try_from(&self.key[..]).map_err(|_| MutableError::InvalidPublicKey)?;
        let signature = Signature::from_bytes(&self.signature);

        key.verify(
            &encode_signable(self.seq, &self.value, self.salt.as_deref()),
            &signature,
        )
        .map_err(|_| MutableError::InvalidSignature)
    }

    // === Getters ===

    pub fn target(&self) -> &Id {
        &self.target
    }

    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn signature(&self) -> &[u8; 64] {
        &self.signature
    }

    pub fn salt(&self) -> Option<&Bytes> {
        self.salt.as_ref()
    }
}

/// The bencoded dictionary body that gets signed: `[4:salt<len>:<salt>]3:seqi<seq>e1:v<len>:<value>`.
pub fn encode_signable(seq: i64, value: &[u8], salt: Option<&[u8]>) -> Box<[u8]> {
    let mut signable = vec![];

    if let Some(salt) = salt.filter(|salt| !salt.is_empty()) {
        signable.extend(format!("4:salt{}:", salt.len()).into_bytes());
        signable.extend(salt);
    }

    signable.extend(format!("3:seqi{}e1:v{}:", seq, value.len()).into_bytes());
    signable.extend(value);

    signable.into()
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Errors building a [MutableItem] from untrusted parts.
pub enum MutableError {
    #[error("Invalid mutable item signature")]
    InvalidSignature,

    #[error("Invalid mutable item public key")]
    InvalidPublicKey,
}
