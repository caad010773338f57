//! File-backed encrypted key-value store.
//! The mapping is sealed with the envelope codec from `sealstore-core`; keys
//! come either from a caller secret or from a master key wrapped by a
//! [`key_wrap::KeyWrapper`] (passphrase or OS keyring).

pub mod file_store;
pub mod key_wrap;
pub mod keying;
pub mod store;

pub use file_store::FileByteStore;
pub use keying::{DirectSecretKeying, Keying, WrappedMasterKeying};
pub use store::SecureStore;
