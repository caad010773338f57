use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use dirs::data_dir;
use sealstore_core::{EnvelopeCodec, Secret};
use sealstore_storage::{
    key_wrap::{KeyringWrapper, PassphraseWrapper},
    DirectSecretKeying, FileByteStore, SecureStore, WrappedMasterKeying,
};
use tracing::debug;

use crate::{
    cli::Command,
    commands,
    config::{Config, Mode},
};

const SECRET_ENV: &str = "SEALSTORE_SECRET";
const WRAP_SECRET_ENV: &str = "SEALSTORE_WRAP_SECRET";
const KEYRING_SERVICE: &str = "sealstore";
const KEYRING_ACCOUNT: &str = "master-key";

/// Resolve the default store file location.
pub fn default_store_path() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| eyre!("no data dir available"))?;
    Ok(base.join("sealstore").join("secure.db"))
}

/// CLI flag, then config override, then the platform default.
pub fn resolve_path(flag: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    match flag.or_else(|| config.store_path.clone()) {
        Some(path) => Ok(path),
        None => default_store_path(),
    }
}

pub fn resolve_mode(wrapped_flag: bool, config: &Config) -> Mode {
    if wrapped_flag {
        Mode::Wrapped
    } else {
        config.mode.unwrap_or_default()
    }
}

fn env_secret(name: &str) -> Option<Secret> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.is_empty())
        .map(Secret::from)
}

/// Open the configured store and run one command against it.
pub async fn open_and_run(
    path: PathBuf,
    mode: Mode,
    config: &Config,
    command: Command,
) -> Result<String> {
    let params = config.kdf.unwrap_or_default();
    let codec = EnvelopeCodec::new(params);
    let backend = FileByteStore::new(&path);
    debug!(path = %path.display(), ?mode, "opening store");

    match mode {
        Mode::Direct => {
            let secret = env_secret(SECRET_ENV)
                .ok_or_else(|| eyre!("{SECRET_ENV} must be set to open the store"))?;
            let store = SecureStore::open(backend, DirectSecretKeying::new(secret)?, codec).await?;
            commands::execute(&store, command).await
        }
        Mode::Wrapped => match env_secret(WRAP_SECRET_ENV) {
            Some(secret) => {
                let wrapper = PassphraseWrapper::with_params(secret, params);
                let store =
                    SecureStore::open(backend, WrappedMasterKeying::new(wrapper), codec).await?;
                commands::execute(&store, command).await
            }
            None => {
                let keyring = config.keyring.clone().unwrap_or_default();
                let wrapper = KeyringWrapper::new(
                    keyring.service.as_deref().unwrap_or(KEYRING_SERVICE),
                    keyring.account.as_deref().unwrap_or(KEYRING_ACCOUNT),
                )?
                .with_params(params);
                let store =
                    SecureStore::open(backend, WrappedMasterKeying::new(wrapper), codec).await?;
                commands::execute(&store, command).await
            }
        },
    }
}
