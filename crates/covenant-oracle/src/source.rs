//! Oracle source port

use crate::error::{OracleError, Result};
use crate::response::Asset;
use async_trait::async_trait;
use covenant_core::Height;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Off-chain indexing service. Implementations return the raw response body;
/// decoding happens in the cache so every source is held to the same format.
#[async_trait]
pub trait OracleSource: Send + Sync {
    /// All external UTXOs the service tracks as of `height`
    async fn fetch_utxos(&self, height: Height) -> Result<String>;

    /// A single external UTXO by id
    async fn fetch_utxo(&self, id: &str) -> Result<String>;

    /// One price quote
    async fn fetch_price(&self, asset: Asset) -> Result<String>;
}

#[derive(Default)]
struct Script {
    utxos: String,
    prices: HashMap<Asset, String>,
    delay: Option<Duration>,
    failing: bool,
    calls: usize,
}

/// Source serving canned responses, with optional latency and failure
#[derive(Default)]
pub struct ScriptedSource {
    script: RwLock<Script>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_utxos(&self, body: impl Into<String>) {
        self.script.write().utxos = body.into();
    }

    pub fn set_price(&self, asset: Asset, body: impl Into<String>) {
        self.script.write().prices.insert(asset, body.into());
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        self.script.write().delay = delay;
    }

    pub fn set_failing(&self, failing: bool) {
        self.script.write().failing = failing;
    }

    /// Requests served so far
    pub fn calls(&self) -> usize {
        self.script.read().calls
    }

    async fn respond(&self, body: impl FnOnce(&Script) -> Option<String>) -> Result<String> {
        let (delay, response) = {
            let mut script = self.script.write();
            script.calls += 1;
            let response = if script.failing {
                Err(OracleError::Source("scripted failure".into()))
            } else {
                body(&script).ok_or_else(|| OracleError::Source("no scripted response".into()))
            };
            (script.delay, response)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        response
    }
}

#[async_trait]
impl OracleSource for ScriptedSource {
    async fn fetch_utxos(&self, _height: Height) -> Result<String> {
        self.respond(|s| Some(s.utxos.clone())).await
    }

    async fn fetch_utxo(&self, id: &str) -> Result<String> {
        self.respond(|s| {
            s.utxos
                .split("<utxo>")
                .find(|block| block.contains(id))
                .map(|block| format!("<utxo>{block}"))
        })
        .await
    }

    async fn fetch_price(&self, asset: Asset) -> Result<String> {
        self.respond(|s| s.prices.get(&asset).cloned()).await
    }
}
