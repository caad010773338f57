use std::{io, path::PathBuf};

use sealstore_core::{
    policy::{coerce_numeric, coerce_sequence, number_value},
    storage::ByteStore,
    CodecError, EnvelopeCodec, Secret, StoreError,
};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use zeroize::Zeroizing;

use crate::{
    file_store::FileByteStore,
    key_wrap::KeyWrapper,
    keying::{DirectSecretKeying, Keying, WrappedMasterKeying},
};

type Mapping = Map<String, Value>;

/// Encrypted key-value store persisted through a [`ByteStore`].
///
/// Construction loads (or creates) the backing content, so every handle is
/// ready to use. Each mutation re-encrypts the whole mapping and writes it
/// before returning. Mutations through one handle are serialized; nothing
/// coordinates separate processes sharing a file.
///
/// If a write fails the error is returned but the in-memory mapping keeps the
/// mutation, so memory is ahead of disk until the next successful write.
pub struct SecureStore<B: ByteStore, K: Keying> {
    backend: B,
    keying: K,
    codec: EnvelopeCodec,
    data: Mutex<Mapping>,
}

impl SecureStore<FileByteStore, DirectSecretKeying> {
    /// File store sealed directly with `secret`.
    pub async fn open_direct(
        path: impl Into<PathBuf>,
        secret: impl Into<Secret>,
    ) -> Result<Self, StoreError> {
        let keying = DirectSecretKeying::new(secret)?;
        Self::open(FileByteStore::new(path), keying, EnvelopeCodec::default()).await
    }
}

impl<W: KeyWrapper> SecureStore<FileByteStore, WrappedMasterKeying<W>> {
    /// File store sealed with a generated master key protected by `wrapper`.
    pub async fn open_wrapped(path: impl Into<PathBuf>, wrapper: W) -> Result<Self, StoreError> {
        Self::open(
            FileByteStore::new(path),
            WrappedMasterKeying::new(wrapper),
            EnvelopeCodec::default(),
        )
        .await
    }
}

impl<B: ByteStore, K: Keying> SecureStore<B, K> {
    /// Load existing content from `backend`, or initialize and write an empty
    /// store if there is none. Any failure aborts construction.
    #[instrument(skip_all)]
    pub async fn open(backend: B, mut keying: K, codec: EnvelopeCodec) -> Result<Self, StoreError> {
        let data = match backend.read().await? {
            None => {
                keying.initialize().await?;
                let data = Mapping::new();
                let file = seal(codec, &keying, &data).await?;
                backend.write(file.as_bytes()).await?;
                debug!("initialized fresh store");
                data
            }
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|_| StoreError::Format {
                    reason: "store file is not valid text".to_string(),
                })?;
                let payload = keying.load(&text).await?;
                let plaintext = unseal(codec, payload, keying.content_key()?).await?;
                let data = parse_mapping(&plaintext)?;
                debug!(entries = data.len(), "loaded existing store");
                data
            }
        };

        Ok(Self {
            backend,
            keying,
            codec,
            data: Mutex::new(data),
        })
    }

    /// Current value for `key`. Never touches disk.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.data.lock().await.get(key).cloned()
    }

    /// Store `value` under `key`, returning it once written.
    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: Value) -> Result<Value, StoreError> {
        let mut data = self.data.lock().await;
        data.insert(key.to_string(), value.clone());
        self.persist(&data).await?;
        Ok(value)
    }

    /// Remove `key`; returns whether it existed. A missing key is not an error.
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut data = self.data.lock().await;
        let existed = data.remove(key).is_some();
        self.persist(&data).await?;
        Ok(existed)
    }

    /// Add `amount` to the number at `key`. A missing or non-numeric value
    /// counts as 0 and is overwritten.
    #[instrument(skip(self, amount))]
    pub async fn add(&self, key: &str, amount: f64) -> Result<Value, StoreError> {
        let mut data = self.data.lock().await;
        let total = number_value(coerce_numeric(data.get(key)) + amount)?;
        data.insert(key.to_string(), total.clone());
        self.persist(&data).await?;
        Ok(total)
    }

    pub async fn subtract(&self, key: &str, amount: f64) -> Result<Value, StoreError> {
        self.add(key, -amount).await
    }

    /// Append `value` to the array at `key`. A missing or non-array value
    /// counts as empty and is overwritten.
    #[instrument(skip(self, value))]
    pub async fn push(&self, key: &str, value: Value) -> Result<Vec<Value>, StoreError> {
        let mut data = self.data.lock().await;
        let mut items = coerce_sequence(data.remove(key));
        items.push(value);
        data.insert(key.to_string(), Value::Array(items.clone()));
        self.persist(&data).await?;
        Ok(items)
    }

    /// Sorted key names.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.data.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.lock().await.is_empty()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    async fn persist(&self, data: &Mapping) -> Result<(), StoreError> {
        let file = seal(self.codec, &self.keying, data).await?;
        if let Err(err) = self.backend.write(file.as_bytes()).await {
            warn!(error = %err, "store write failed; in-memory state is ahead of disk");
            return Err(err.into());
        }
        Ok(())
    }
}

// scrypt is CPU-bound, so envelope work runs on the blocking pool.
async fn seal<K: Keying>(
    codec: EnvelopeCodec,
    keying: &K,
    data: &Mapping,
) -> Result<String, StoreError> {
    let key = Zeroizing::new(keying.content_key()?.to_vec());
    let plaintext = Zeroizing::new(
        serde_json::to_vec(data)
            .map_err(|e| StoreError::corruption(format!("serialization failed: {e}")))?,
    );
    let payload = tokio::task::spawn_blocking(move || codec.encode(&plaintext, &key))
        .await
        .map_err(io::Error::other)??;
    keying.frame(payload)
}

async fn unseal(
    codec: EnvelopeCodec,
    payload: String,
    key: &[u8],
) -> Result<Zeroizing<Vec<u8>>, StoreError> {
    let key = Zeroizing::new(key.to_vec());
    tokio::task::spawn_blocking(move || codec.decode(&payload, &key))
        .await
        .map_err(io::Error::other)?
        .map_err(load_err)
}

fn parse_mapping(plaintext: &[u8]) -> Result<Mapping, StoreError> {
    match serde_json::from_slice::<Value>(plaintext) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(StoreError::corruption("payload is not a JSON object")),
        Err(e) => Err(StoreError::corruption(format!("payload is not valid JSON: {e}"))),
    }
}

// Authentication failures while loading mean the store cannot be opened.
fn load_err(err: CodecError) -> StoreError {
    match err {
        CodecError::Authentication => {
            StoreError::configuration("wrong secret or corrupted store")
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::{engine::general_purpose, Engine as _};
    use sealstore_core::{storage::InMemoryByteStore, KdfParams};
    use serde_json::json;

    use keyring::mock::MockCredential;

    use super::*;
    use crate::key_wrap::{KeyringWrapper, PassphraseWrapper};

    fn codec() -> EnvelopeCodec {
        EnvelopeCodec::new(KdfParams::new(4, 8, 1).expect("params"))
    }

    fn keying(secret: &str) -> DirectSecretKeying {
        DirectSecretKeying::new(secret).expect("keying")
    }

    fn wrapped(secret: &str) -> WrappedMasterKeying<PassphraseWrapper> {
        WrappedMasterKeying::new(PassphraseWrapper::with_params(
            secret,
            KdfParams::new(4, 8, 1).expect("params"),
        ))
    }

    async fn memory_store(
        backend: &InMemoryByteStore,
        secret: &str,
    ) -> SecureStore<InMemoryByteStore, DirectSecretKeying> {
        SecureStore::open(backend.clone(), keying(secret), codec())
            .await
            .expect("open")
    }

    fn stored_text(backend: &InMemoryByteStore) -> String {
        String::from_utf8(backend.content().expect("content")).expect("utf8")
    }

    #[tokio::test]
    async fn fresh_direct_store_writes_empty_envelope_immediately() {
        let backend = InMemoryByteStore::new();
        let store = memory_store(&backend, "pw").await;
        assert!(store.is_empty().await);

        let text = stored_text(&backend);
        let plaintext = codec().decode(&text, b"pw").expect("decode");
        assert_eq!(plaintext.as_slice(), b"{}");
    }

    #[tokio::test]
    async fn set_is_durable_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("secure.db");

        let store = SecureStore::open(FileByteStore::new(&path), keying("pw"), codec())
            .await
            .expect("open");
        assert_eq!(store.set("n", json!(5)).await.expect("set"), json!(5));
        drop(store);

        let reopened = SecureStore::open(FileByteStore::new(&path), keying("pw"), codec())
            .await
            .expect("reopen");
        assert_eq!(reopened.get("n").await, Some(json!(5)));
    }

    #[tokio::test]
    async fn plaintext_never_reaches_the_backend() {
        let backend = InMemoryByteStore::new();
        let store = memory_store(&backend, "pw").await;
        store
            .set("token", json!("very-secret-value"))
            .await
            .expect("set");
        assert!(!stored_text(&backend).contains("very-secret-value"));
        assert!(!stored_text(&backend).contains("token"));
    }

    #[tokio::test]
    async fn get_of_missing_key_is_none() {
        let store = memory_store(&InMemoryByteStore::new(), "pw").await;
        assert_eq!(store.get("nope").await, None);
    }

    #[tokio::test]
    async fn add_coerces_missing_and_non_numeric_values() {
        let store = memory_store(&InMemoryByteStore::new(), "pw").await;
        assert_eq!(store.add("missing", 3.0).await.expect("add"), json!(3));
        assert_eq!(store.add("missing", 2.0).await.expect("add"), json!(5));

        store.set("word", json!("text")).await.expect("set");
        assert_eq!(store.add("word", 1.5).await.expect("add"), json!(1.5));
        assert_eq!(store.get("word").await, Some(json!(1.5)));
    }

    #[tokio::test]
    async fn subtract_is_negative_add() {
        let store = memory_store(&InMemoryByteStore::new(), "pw").await;
        store.set("n", json!(10)).await.expect("set");
        assert_eq!(store.subtract("n", 4.0).await.expect("sub"), json!(6));
        assert_eq!(store.subtract("fresh", 2.0).await.expect("sub"), json!(-2));
    }

    #[tokio::test]
    async fn non_finite_result_leaves_value_untouched() {
        let backend = InMemoryByteStore::new();
        let store = memory_store(&backend, "pw").await;
        store.set("n", json!(1)).await.expect("set");
        let before = backend.content();

        let err = store.add("n", f64::NAN).await.expect_err("nan");
        assert!(matches!(err, StoreError::NonFiniteNumber));
        assert_eq!(store.get("n").await, Some(json!(1)));
        assert_eq!(backend.content(), before);
    }

    #[tokio::test]
    async fn push_coerces_missing_and_non_sequence_values() {
        let store = memory_store(&InMemoryByteStore::new(), "pw").await;
        assert_eq!(
            store.push("list", json!("a")).await.expect("push"),
            vec![json!("a")]
        );
        assert_eq!(
            store.push("list", json!(2)).await.expect("push"),
            vec![json!("a"), json!(2)]
        );

        store.set("scalar", json!(7)).await.expect("set");
        assert_eq!(
            store.push("scalar", json!("b")).await.expect("push"),
            vec![json!("b")]
        );
        assert_eq!(store.get("list").await, Some(json!(["a", 2])));
    }

    #[tokio::test]
    async fn delete_reports_prior_existence() {
        let store = memory_store(&InMemoryByteStore::new(), "pw").await;
        assert!(!store.delete("absent").await.expect("delete"));

        store.set("present", json!(true)).await.expect("set");
        assert!(store.delete("present").await.expect("delete"));
        assert_eq!(store.get("present").await, None);
    }

    #[tokio::test]
    async fn nested_values_survive_reopen() {
        let backend = InMemoryByteStore::new();
        let store = memory_store(&backend, "pw").await;
        let value = json!({"a": [1, "two", {"three": false}], "b": 2.5});
        store.set("doc", value.clone()).await.expect("set");
        store.set("other", json!(null)).await.expect("set");

        let reopened = memory_store(&backend, "pw").await;
        assert_eq!(reopened.get("doc").await, Some(value));
        assert_eq!(reopened.keys().await, vec!["doc", "other"]);
        assert_eq!(reopened.len().await, 2);
    }

    #[tokio::test]
    async fn wrong_secret_fails_construction_with_configuration_error() {
        let backend = InMemoryByteStore::new();
        memory_store(&backend, "right").await;

        let err = SecureStore::open(backend.clone(), keying("wrong"), codec())
            .await
            .err()
            .expect("wrong secret");
        assert!(matches!(err, StoreError::Configuration { .. }));
    }

    #[tokio::test]
    async fn tampered_file_fails_construction() {
        let backend = InMemoryByteStore::new();
        let store = memory_store(&backend, "pw").await;
        store.set("k", json!("v")).await.expect("set");

        let mut raw = general_purpose::STANDARD
            .decode(stored_text(&backend))
            .expect("b64");
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered =
            InMemoryByteStore::with_content(general_purpose::STANDARD.encode(raw).into_bytes());

        let err = SecureStore::open(tampered, keying("pw"), codec())
            .await
            .err()
            .expect("tampered");
        assert!(matches!(err, StoreError::Configuration { .. }));
    }

    #[tokio::test]
    async fn malformed_envelope_is_a_format_error() {
        let backend = InMemoryByteStore::with_content(b"@@not-an-envelope@@".to_vec());
        let err = SecureStore::open(backend, keying("pw"), codec())
            .await
            .err()
            .expect("malformed");
        assert!(matches!(err, StoreError::Format { .. }));
    }

    #[tokio::test]
    async fn authenticated_non_mapping_payload_is_corruption() {
        for payload in [&b"not json"[..], &b"[1, 2, 3]"[..]] {
            let envelope = codec().encode(payload, b"pw").expect("encode");
            let backend = InMemoryByteStore::with_content(envelope.into_bytes());
            let err = SecureStore::open(backend, keying("pw"), codec())
                .await
                .err()
                .expect("corrupt");
            assert!(matches!(err, StoreError::Corruption { .. }));
        }
    }

    #[tokio::test]
    async fn corrupt_file_is_left_untouched() {
        let backend = InMemoryByteStore::with_content(b"garbage".to_vec());
        assert!(SecureStore::open(backend.clone(), keying("pw"), codec())
            .await
            .is_err());
        assert_eq!(backend.content().as_deref(), Some(&b"garbage"[..]));
    }

    #[tokio::test]
    async fn failed_write_surfaces_io_error_and_keeps_memory_mutated() {
        let backend = InMemoryByteStore::new();
        let store = memory_store(&backend, "pw").await;
        store.set("n", json!(1)).await.expect("set");
        let on_disk = backend.content();

        backend.fail_writes(true);
        let err = store.set("n", json!(2)).await.expect_err("write fails");
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(store.get("n").await, Some(json!(2)));
        assert_eq!(backend.content(), on_disk);

        backend.fail_writes(false);
        store.add("n", 1.0).await.expect("recovered write");
        let reopened = memory_store(&backend, "pw").await;
        assert_eq!(reopened.get("n").await, Some(json!(3)));
    }

    #[tokio::test]
    async fn concurrent_mutations_do_not_lose_updates() {
        let store = Arc::new(memory_store(&InMemoryByteStore::new(), "pw").await);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.add("count", 1.0).await })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("add");
        }
        assert_eq!(store.get("count").await, Some(json!(8)));
    }

    #[tokio::test]
    async fn wrapped_store_persists_record_and_reloads() {
        let backend = InMemoryByteStore::new();
        let store = SecureStore::open(backend.clone(), wrapped("outer"), codec())
            .await
            .expect("open");
        store.push("log", json!("first")).await.expect("push");

        let record: Value = serde_json::from_str(&stored_text(&backend)).expect("json");
        assert!(record["_meta"]["key"].is_string());
        assert!(record["payload"].is_string());

        let reopened = SecureStore::open(backend.clone(), wrapped("outer"), codec())
            .await
            .expect("reopen");
        assert_eq!(reopened.get("log").await, Some(json!(["first"])));
    }

    #[tokio::test]
    async fn wrapped_master_key_is_stable_across_writes() {
        let backend = InMemoryByteStore::new();
        let store = SecureStore::open(backend.clone(), wrapped("outer"), codec())
            .await
            .expect("open");
        let first: Value = serde_json::from_str(&stored_text(&backend)).expect("json");
        store.set("a", json!(1)).await.expect("set");
        let second: Value = serde_json::from_str(&stored_text(&backend)).expect("json");

        assert_eq!(first["_meta"]["key"], second["_meta"]["key"]);
        assert_ne!(first["payload"], second["payload"]);
    }

    #[tokio::test]
    async fn wrapped_stores_with_different_wrapping_secrets_are_isolated() {
        let a = InMemoryByteStore::new();
        let b = InMemoryByteStore::new();
        SecureStore::open(a.clone(), wrapped("alpha"), codec())
            .await
            .expect("open a");
        SecureStore::open(b.clone(), wrapped("beta"), codec())
            .await
            .expect("open b");

        let err = SecureStore::open(a, wrapped("beta"), codec())
            .await
            .err()
            .expect("beta cannot unwrap alpha");
        assert!(matches!(err, StoreError::Configuration { .. }));
        let err = SecureStore::open(b, wrapped("alpha"), codec())
            .await
            .err()
            .expect("alpha cannot unwrap beta");
        assert!(matches!(err, StoreError::Configuration { .. }));
    }

    #[tokio::test]
    async fn direct_file_is_not_a_wrapped_record() {
        let backend = InMemoryByteStore::new();
        memory_store(&backend, "pw").await;
        let err = SecureStore::open(backend, wrapped("pw"), codec())
            .await
            .err()
            .expect("wrong variant");
        assert!(matches!(err, StoreError::Corruption { .. }));
    }

    #[tokio::test]
    async fn wrapped_store_reopens_through_keyring() {
        let entry = keyring::Entry::new_with_credential(Box::new(MockCredential::default()));
        let wrapper = KeyringWrapper::from_entry(entry)
            .with_params(KdfParams::new(4, 8, 1).expect("params"));
        let backend = InMemoryByteStore::new();

        let store = SecureStore::open(
            backend.clone(),
            WrappedMasterKeying::new(wrapper.clone()),
            codec(),
        )
        .await
        .expect("open");
        store.set("k", json!("v")).await.expect("set");
        drop(store);

        let reopened = SecureStore::open(backend, WrappedMasterKeying::new(wrapper), codec())
            .await
            .expect("reopen");
        assert_eq!(reopened.get("k").await, Some(json!("v")));
    }

    #[tokio::test]
    async fn whitespace_only_file_is_rejected_and_left_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("secure.db");
        std::fs::write(&path, "\n").expect("write");

        let err = SecureStore::open(FileByteStore::new(&path), keying("pw"), codec())
            .await
            .err()
            .expect("not a store");
        assert!(matches!(err, StoreError::Format { .. }));
        assert_eq!(std::fs::read(&path).expect("read"), b"\n");
    }

    #[tokio::test]
    async fn open_direct_rejects_empty_secret() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = SecureStore::open_direct(dir.path().join("secure.db"), "")
            .await
            .err()
            .expect("empty secret");
        assert!(matches!(err, StoreError::Configuration { .. }));
        assert!(!dir.path().join("secure.db").exists());
    }
}
