use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use sealstore_core::{
    secret::MASTER_KEY_LEN, CodecError, EnvelopeCodec, KdfParams, MasterKey, Secret,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    /// Tampered wrapped key or wrong external secret.
    #[error("wrapped key failed authentication")]
    Authentication,
}

impl From<CodecError> for KeyError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Authentication => KeyError::Authentication,
            other => KeyError::Decode(other.to_string()),
        }
    }
}

/// Protects the store's master key so it can sit next to the payload on disk.
#[async_trait]
pub trait KeyWrapper: Send + Sync {
    /// Encrypt the master key into opaque text.
    async fn wrap(&self, master: &MasterKey) -> Result<String, KeyError>;

    /// Recover the master key from text produced by [`KeyWrapper::wrap`].
    async fn unwrap(&self, wrapped: &str) -> Result<MasterKey, KeyError>;
}

/// 32 fresh random bytes from the OS RNG.
pub fn generate_master_key() -> MasterKey {
    MasterKey::generate()
}

/// Wraps the master key in an envelope under an external passphrase.
#[derive(Debug, Clone)]
pub struct PassphraseWrapper {
    secret: Secret,
    codec: EnvelopeCodec,
}

impl PassphraseWrapper {
    pub fn new(secret: impl Into<Secret>) -> Self {
        Self::with_params(secret, KdfParams::default())
    }

    pub fn with_params(secret: impl Into<Secret>, params: KdfParams) -> Self {
        Self {
            secret: secret.into(),
            codec: EnvelopeCodec::new(params),
        }
    }
}

#[async_trait]
impl KeyWrapper for PassphraseWrapper {
    async fn wrap(&self, master: &MasterKey) -> Result<String, KeyError> {
        Ok(self.codec.encode(master.expose(), self.secret.expose())?)
    }

    async fn unwrap(&self, wrapped: &str) -> Result<MasterKey, KeyError> {
        let bytes = self.codec.decode(wrapped, self.secret.expose())?;
        MasterKey::from_slice(&bytes).ok_or_else(|| {
            KeyError::Decode(format!(
                "expected {MASTER_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })
    }
}

/// Keeps a random key-encryption key in the OS keyring (created on first use)
/// and wraps the master key in an envelope under it.
///
/// Clones share one keyring entry.
#[derive(Clone)]
pub struct KeyringWrapper {
    entry: Arc<keyring::Entry>,
    codec: EnvelopeCodec,
}

impl KeyringWrapper {
    pub fn new(service: &str, account: &str) -> Result<Self, KeyError> {
        let entry = keyring::Entry::new(service, account).map_err(keyring_err)?;
        debug!(service, account, "using keyring entry");
        Ok(Self::from_entry(entry))
    }

    /// Wrap with an already built entry, e.g. one backed by a custom credential.
    pub fn from_entry(entry: keyring::Entry) -> Self {
        Self {
            entry: Arc::new(entry),
            codec: EnvelopeCodec::default(),
        }
    }

    pub fn with_params(mut self, params: KdfParams) -> Self {
        self.codec = EnvelopeCodec::new(params);
        self
    }

    // Only a missing entry creates a new key. Any other failure must not
    // replace a stored key, or every store wrapped under it becomes unreadable.
    fn get_or_create_kek(&self) -> Result<MasterKey, KeyError> {
        match self.entry.get_password() {
            Ok(stored) => decode_key(&stored),
            Err(keyring::Error::NoEntry) => {
                debug!("creating key-encryption key in keyring");
                let kek = MasterKey::generate();
                self.entry
                    .set_password(&kek.to_base64())
                    .map_err(keyring_err)?;
                Ok(kek)
            }
            Err(err) => Err(keyring_err(err)),
        }
    }

    fn existing_kek(&self) -> Result<MasterKey, KeyError> {
        let stored = self.entry.get_password().map_err(keyring_err)?;
        decode_key(&stored)
    }
}

#[async_trait]
impl KeyWrapper for KeyringWrapper {
    async fn wrap(&self, master: &MasterKey) -> Result<String, KeyError> {
        let kek = self.get_or_create_kek()?;
        Ok(self.codec.encode(master.expose(), kek.expose())?)
    }

    async fn unwrap(&self, wrapped: &str) -> Result<MasterKey, KeyError> {
        let kek = self.existing_kek()?;
        let bytes = self.codec.decode(wrapped, kek.expose())?;
        MasterKey::from_slice(&bytes)
            .ok_or_else(|| KeyError::Decode(format!("expected {MASTER_KEY_LEN} bytes")))
    }
}

fn keyring_err(err: keyring::Error) -> KeyError {
    KeyError::Keyring(err.to_string())
}

fn decode_key(secret: &str) -> Result<MasterKey, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    MasterKey::from_slice(&bytes).ok_or_else(|| {
        KeyError::Decode(format!(
            "expected {MASTER_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}
