//! Core building blocks for sealstore: the envelope codec, key derivation,
//! error taxonomy and the byte-I/O contract the store engine persists through.
//! This crate has no knowledge of files or key management.

pub mod envelope;
pub mod error;
pub mod kdf;
pub mod policy;
pub mod secret;
pub mod storage;

pub use envelope::EnvelopeCodec;
pub use error::{CodecError, StoreError};
pub use kdf::KdfParams;
pub use secret::{MasterKey, Secret};
