use std::path::PathBuf;

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use mockall::automock;
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::value::{G1Point, G2Point};

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("Unsupported key source type {0}")]
    UnsupportedSource(String),

    #[error("{scheme} keys are not supported by this signer")]
    UnsupportedScheme { scheme: KeyScheme },

    #[error("Failed to load key {path}: {reason}")]
    KeyLoad { path: PathBuf, reason: String },

    #[error("Digest is not valid for {scheme} signing")]
    InvalidDigest { scheme: KeyScheme },

    #[error("Signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum KeyScheme {
    Ecdsa,
    Bls,
}

/// How key material is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum KeySourceType {
    /// Encrypted key file on local disk
    #[strum(serialize = "local", serialize = "keystore")]
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub scheme: KeyScheme,
    pub source: KeySourceType,
    pub file: PathBuf,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Ecdsa { address: Address },
    Bls { g1: G1Point, g2: G2Point },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningDigest {
    Hash(B256),
    /// Message already hashed onto G1, as BLS registration contracts expect.
    G1(G1Point),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    Ecdsa(Vec<u8>),
    Bls(G1Point),
}

/// Key loading and signing. Owns all cryptography; the function registry only calls it.
#[automock]
#[async_trait]
pub trait Signer: Send + Sync {
    async fn public_key(&self, key: &KeyDescriptor) -> Result<PublicKey, SignerError>;

    async fn sign(&self, key: &KeyDescriptor, digest: &SigningDigest) -> Result<Signature, SignerError>;
}

/// Signs with ECDSA keys stored as encrypted JSON keystores.
#[derive(Debug, Default)]
pub struct LocalKeystoreSigner;

impl LocalKeystoreSigner {
    fn decrypt(key: &KeyDescriptor) -> Result<PrivateKeySigner, SignerError> {
        if key.scheme != KeyScheme::Ecdsa {
            return Err(SignerError::UnsupportedScheme { scheme: key.scheme });
        }
        PrivateKeySigner::decrypt_keystore(&key.file, &key.password)
            .map_err(|e| SignerError::KeyLoad { path: key.file.clone(), reason: e.to_string() })
    }
}

#[async_trait]
impl Signer for LocalKeystoreSigner {
    async fn public_key(&self, key: &KeyDescriptor) -> Result<PublicKey, SignerError> {
        let signer = Self::decrypt(key)?;
        Ok(PublicKey::Ecdsa { address: signer.address() })
    }

    async fn sign(&self, key: &KeyDescriptor, digest: &SigningDigest) -> Result<Signature, SignerError> {
        let signer = Self::decrypt(key)?;
        let SigningDigest::Hash(hash) = digest else {
            return Err(SignerError::InvalidDigest { scheme: KeyScheme::Ecdsa });
        };
        let signature = signer.sign_hash_sync(hash).map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(Signature::Ecdsa(signature.as_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("local", KeySourceType::Local)]
    #[case("keystore", KeySourceType::Local)]
    fn parses_key_source_types(#[case] input: &str, #[case] expected: KeySourceType) {
        assert_eq!(input.parse::<KeySourceType>().unwrap(), expected);
    }

    #[tokio::test]
    async fn local_signer_rejects_bls_keys() {
        let key = KeyDescriptor {
            scheme: KeyScheme::Bls,
            source: KeySourceType::Local,
            file: PathBuf::from("bls.json"),
            password: String::new(),
        };
        let result = LocalKeystoreSigner.public_key(&key).await;
        assert!(matches!(result, Err(SignerError::UnsupportedScheme { scheme: KeyScheme::Bls })));
    }

    #[tokio::test]
    async fn local_signer_reports_missing_keystore() {
        let dir = tempfile::tempdir().unwrap();
        let key = KeyDescriptor {
            scheme: KeyScheme::Ecdsa,
            source: KeySourceType::Local,
            file: dir.path().join("missing.json"),
            password: "secret".to_string(),
        };
        let result = LocalKeystoreSigner.sign(&key, &SigningDigest::Hash(B256::ZERO)).await;
        assert!(matches!(result, Err(SignerError::KeyLoad { .. })));
    }
}
