//! scrypt key derivation: secret + salt -> 256-bit key.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::CodecError;

/// Length of the derived key in bytes.
pub const KEY_LEN: usize = 32;

/// scrypt cost parameters. Not stored in the envelope, so every party
/// decoding a file must be configured with the values that encoded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost `N`.
    pub log_n: u8,
    /// Block size.
    pub r: u32,
    /// Parallelism.
    pub p: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // N = 16384, r = 8, p = 1 (~16 MiB per derivation)
        Self {
            log_n: 14,
            r: 8,
            p: 1,
        }
    }
}

impl KdfParams {
    pub fn new(log_n: u8, r: u32, p: u32) -> Result<Self, CodecError> {
        let params = Self { log_n, r, p };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        self.to_scrypt().map(|_| ())
    }

    fn to_scrypt(self) -> Result<scrypt::Params, CodecError> {
        scrypt::Params::new(self.log_n, self.r, self.p, KEY_LEN)
            .map_err(|e| CodecError::Kdf(format!("invalid scrypt params: {e}")))
    }
}

/// Derive a 256-bit key from a secret and salt.
pub fn derive_key(
    secret: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>, CodecError> {
    let scrypt_params = params.to_scrypt()?;
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt::scrypt(secret, salt, &scrypt_params, key.as_mut_slice())
        .map_err(|e| CodecError::Kdf(e.to_string()))?;
    Ok(key)
}
