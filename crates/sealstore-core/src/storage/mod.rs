//! Byte-I/O contract the store engine persists through.

mod byte_store;

pub use byte_store::{ByteStore, InMemoryByteStore};
