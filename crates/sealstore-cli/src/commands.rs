use color_eyre::{eyre::bail, Result};
use sealstore_core::storage::ByteStore;
use sealstore_storage::{Keying, SecureStore};
use serde_json::Value;

use crate::cli::Command;

/// Run a store subcommand and return the text to print.
pub async fn execute<B: ByteStore, K: Keying>(
    store: &SecureStore<B, K>,
    command: Command,
) -> Result<String> {
    let output = match command {
        Command::Get { key } => match store.get(&key).await {
            Some(value) => render(&value),
            None => "key not found".to_string(),
        },
        Command::Set { key, value } => {
            let stored = store.set(&key, parse_value(value)).await?;
            format!("stored '{key}' = {}", render(&stored))
        }
        Command::Delete { key } => {
            if store.delete(&key).await? {
                format!("deleted '{key}'")
            } else {
                format!("'{key}' was not present")
            }
        }
        Command::Add { key, amount } => render(&store.add(&key, amount).await?),
        Command::Subtract { key, amount } => render(&store.subtract(&key, amount).await?),
        Command::Push { key, value } => {
            render(&Value::Array(store.push(&key, parse_value(value)).await?))
        }
        Command::List => {
            let keys = store.keys().await;
            if keys.is_empty() {
                "No keys stored.".to_string()
            } else {
                keys.join("\n")
            }
        }
        Command::Version | Command::Config(_) => bail!("not a store command"),
    };
    Ok(output)
}

/// JSON when it parses, a plain string otherwise.
fn parse_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
