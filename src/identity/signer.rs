use crate::identity::{Keypair, PublicKey};
use ed25519_dalek::{Signature as DalekSignature, Signer as DalekSigner, Verifier};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Invalid signature length: expected 64, got {0}")]
    InvalidLength(usize),

    #[error("Invalid signature bytes: {0}")]
    InvalidBytes(String),

    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),
}

/// Ed25519 signature (64 bytes), hex encoded on the wire
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    inner: DalekSignature,
    bytes: [u8; 64],
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct SignatureVisitor;

        impl<'de> Visitor<'de> for SignatureVisitor {
            type Value = Signature;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a hex-encoded 64-byte Ed25519 signature")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Signature::from_hex(v).map_err(|e| E::custom(e.to_string()))
            }
        }

        deserializer.deserialize_str(SignatureVisitor)
    }
}

impl Signature {
    /// Get the raw bytes of the signature
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Create a signature from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != 64 {
            return Err(SignatureError::InvalidLength(bytes.len()));
        }

        let bytes_array: [u8; 64] = bytes.try_into().map_err(|_| {
            SignatureError::InvalidBytes("Failed to convert to array".into())
        })?;

        let inner = DalekSignature::from_bytes(&bytes_array);
        Ok(Self { inner, bytes: bytes_array })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s).map_err(|e| SignatureError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Short prefix for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.bytes[..6])
    }

    fn from_inner(inner: DalekSignature) -> Self {
        let bytes = inner.to_bytes();
        Self { inner, bytes }
    }

    pub(crate) fn inner(&self) -> &DalekSignature {
        &self.inner
    }
}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.short())
    }
}

/// Signing and verification operations
///
/// Ed25519 signing is deterministic: the same key and message always yield
/// the same signature, which the lottery draw relies on.
pub struct Signer;

impl Signer {
    /// Sign a message with a keypair
    pub fn sign(keypair: &Keypair, message: &[u8]) -> Signature {
        let sig = keypair.signing_key().sign(message);
        Signature::from_inner(sig)
    }

    /// Verify a signature against a public key and message
    pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> bool {
        public_key.inner().verify(message, signature.inner()).is_ok()
    }
}
