//! Authenticated envelope codec.
//!
//! Layout before base64:
//! ```text
//! SALT (16) | NONCE (12) | TAG (16) | CIPHERTEXT
//! ```
//! Every encode draws a fresh salt and nonce, so the key fed to AES-256-GCM
//! is re-derived per envelope and two encodings of the same input never match.

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use tracing::instrument;
use zeroize::Zeroizing;

use crate::{
    error::CodecError,
    kdf::{derive_key, KdfParams},
};

pub const SALT_LEN: usize = 16;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Fixed header preceding the ciphertext.
pub const HEADER_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Borrowed view over a decoded envelope split at its fixed offsets.
#[derive(Debug, PartialEq, Eq)]
pub struct EnvelopeParts<'a> {
    pub salt: &'a [u8],
    pub nonce: &'a [u8],
    pub tag: &'a [u8],
    pub ciphertext: &'a [u8],
}

/// Split raw envelope bytes into salt, nonce, tag and ciphertext.
pub fn split_envelope(bytes: &[u8]) -> Result<EnvelopeParts<'_>, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Format(format!(
            "expected at least {HEADER_LEN} bytes, got {}",
            bytes.len()
        )));
    }

    let (salt, rest) = bytes.split_at(SALT_LEN);
    let (nonce, rest) = rest.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);
    Ok(EnvelopeParts {
        salt,
        nonce,
        tag,
        ciphertext,
    })
}

/// Turns plaintext + secret into base64 envelope text and back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnvelopeCodec {
    params: KdfParams,
}

impl EnvelopeCodec {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    #[instrument(skip_all, fields(len = plaintext.len()))]
    pub fn encode(&self, plaintext: &[u8], secret: &[u8]) -> Result<String, CodecError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut nonce);

        let cipher = self.cipher(secret, &salt)?;
        let mut buffer = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
            .map_err(|e| CodecError::Kdf(format!("encrypt failed: {e}")))?;

        let mut out = Vec::with_capacity(HEADER_LEN + buffer.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(tag.as_slice());
        out.extend_from_slice(&buffer);
        Ok(general_purpose::STANDARD.encode(out))
    }

    #[instrument(skip_all)]
    pub fn decode(&self, envelope: &str, secret: &[u8]) -> Result<Zeroizing<Vec<u8>>, CodecError> {
        let bytes = general_purpose::STANDARD
            .decode(envelope.trim())
            .map_err(|e| CodecError::Format(format!("invalid base64: {e}")))?;
        let parts = split_envelope(&bytes)?;

        let cipher = self.cipher(secret, parts.salt)?;
        let mut buffer = Zeroizing::new(parts.ciphertext.to_vec());
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(parts.nonce),
                b"",
                &mut buffer[..],
                Tag::from_slice(parts.tag),
            )
            .map_err(|_| CodecError::Authentication)?;
        Ok(buffer)
    }

    fn cipher(&self, secret: &[u8], salt: &[u8]) -> Result<Aes256Gcm, CodecError> {
        let key = derive_key(secret, salt, &self.params)?;
        Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| CodecError::Kdf(format!("cipher init failed: {e}")))
    }
}
