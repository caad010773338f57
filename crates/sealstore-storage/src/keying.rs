//! Key management strategies, chosen once per store.
//!
//! - [`DirectSecretKeying`]: the caller's secret seals the mapping and the file
//!   is the bare envelope text.
//! - [`WrappedMasterKeying`]: a random master key seals the mapping; the file is
//!   a JSON record carrying the wrapped master key next to the payload.

use async_trait::async_trait;
use sealstore_core::{MasterKey, Secret, StoreError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::key_wrap::{generate_master_key, KeyError, KeyWrapper};

const WRONG_SECRET: &str = "wrong secret or corrupted store";

#[async_trait]
pub trait Keying: Send + Sync {
    /// Prepare keys for a store that has no backing file yet.
    async fn initialize(&mut self) -> Result<(), StoreError>;

    /// Recover keys from an existing file and return the payload envelope text.
    async fn load(&mut self, file: &str) -> Result<String, StoreError>;

    /// Secret handed to the envelope codec for the payload. Fails until
    /// [`Keying::initialize`] or [`Keying::load`] has run.
    fn content_key(&self) -> Result<&[u8], StoreError>;

    /// Build the file content around a freshly encoded payload.
    fn frame(&self, payload: String) -> Result<String, StoreError>;
}

/// Caller-supplied secret; file content is the envelope only.
#[derive(Debug)]
pub struct DirectSecretKeying {
    secret: Secret,
}

impl DirectSecretKeying {
    pub fn new(secret: impl Into<Secret>) -> Result<Self, StoreError> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(StoreError::configuration("a non-empty secret is required"));
        }
        Ok(Self { secret })
    }
}

#[async_trait]
impl Keying for DirectSecretKeying {
    async fn initialize(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load(&mut self, file: &str) -> Result<String, StoreError> {
        Ok(file.trim().to_string())
    }

    fn content_key(&self) -> Result<&[u8], StoreError> {
        Ok(self.secret.expose())
    }

    fn frame(&self, payload: String) -> Result<String, StoreError> {
        Ok(payload)
    }
}

/// On-disk record for the wrapped variant.
#[derive(Debug, Serialize, Deserialize)]
struct WrappedFile {
    #[serde(rename = "_meta", alias = "metadata")]
    meta: WrappedMeta,
    payload: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WrappedMeta {
    key: String,
}

struct Keys {
    master: MasterKey,
    wrapped: String,
}

/// Random master key protected by a [`KeyWrapper`].
pub struct WrappedMasterKeying<W: KeyWrapper> {
    wrapper: W,
    keys: Option<Keys>,
}

impl<W: KeyWrapper> WrappedMasterKeying<W> {
    pub fn new(wrapper: W) -> Self {
        Self {
            wrapper,
            keys: None,
        }
    }

    fn keys(&self) -> Result<&Keys, StoreError> {
        self.keys
            .as_ref()
            .ok_or_else(|| StoreError::configuration("master key not initialized"))
    }
}

#[async_trait]
impl<W: KeyWrapper> Keying for WrappedMasterKeying<W> {
    async fn initialize(&mut self) -> Result<(), StoreError> {
        if self.keys.is_some() {
            return Ok(());
        }
        let master = generate_master_key();
        let wrapped = self.wrapper.wrap(&master).await.map_err(key_err)?;
        debug!("generated new master key");
        self.keys = Some(Keys { master, wrapped });
        Ok(())
    }

    async fn load(&mut self, file: &str) -> Result<String, StoreError> {
        let record: WrappedFile = serde_json::from_str(file)
            .map_err(|e| StoreError::corruption(format!("invalid store record: {e}")))?;
        let master = self
            .wrapper
            .unwrap(&record.meta.key)
            .await
            .map_err(key_err)?;
        self.keys = Some(Keys {
            master,
            wrapped: record.meta.key,
        });
        Ok(record.payload)
    }

    fn content_key(&self) -> Result<&[u8], StoreError> {
        Ok(self.keys()?.master.expose().as_slice())
    }

    fn frame(&self, payload: String) -> Result<String, StoreError> {
        let record = WrappedFile {
            meta: WrappedMeta {
                key: self.keys()?.wrapped.clone(),
            },
            payload,
        };
        serde_json::to_string(&record)
            .map_err(|e| StoreError::corruption(format!("record serialization failed: {e}")))
    }
}

fn key_err(err: KeyError) -> StoreError {
    match err {
        KeyError::Authentication => StoreError::configuration(WRONG_SECRET),
        KeyError::Decode(reason) => {
            StoreError::configuration(format!("{WRONG_SECRET}: {reason}"))
        }
        KeyError::Keyring(reason) => StoreError::configuration(format!("keyring: {reason}")),
    }
}
