//! Pipeline harness shared by the integration tests

#![allow(dead_code)]

use covenant_core::{
    Fixed, Height, ManualClock, MemoryChain, OutPoint, Timestamp, Transaction, TxId, TxOut, COIN,
};
use covenant_crypto::KeyPair;
use covenant_node::{BlockSummary, CommitmentEngine, DashStakeOptions, NodeConfig, WhaleStakeOptions};
use covenant_oracle::{Asset, ScriptedSource};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Past both budget switch heights on mainnet
pub const TIP: Height = 250_000;
pub const TIME: Timestamp = 1_700_000_000;

pub fn fx(s: &str) -> Fixed {
    Fixed::parse(s).unwrap()
}

pub fn native_key() -> KeyPair {
    KeyPair::from_secret_bytes(&[1u8; 32]).unwrap()
}

pub fn dash_key() -> KeyPair {
    KeyPair::from_secret_bytes(&[2u8; 32]).unwrap()
}

pub fn return_address() -> String {
    KeyPair::from_secret_bytes(&[7u8; 32])
        .unwrap()
        .address(covenant_crypto::NATIVE_ADDRESS_VERSION)
        .to_string()
}

pub struct Pipeline {
    _dir: tempfile::TempDir,
    pub chain: Arc<MemoryChain>,
    pub clock: Arc<ManualClock>,
    pub engine: CommitmentEngine,
    funded: AtomicU32,
}

impl Pipeline {
    /// Mainnet rules with dash stakes switched on
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(edit: impl FnOnce(&mut NodeConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig::default();
        config.node.data_dir = dir.path().display().to_string();
        config.staking.dash_stake_enabled = true;
        edit(&mut config);

        let clock = Arc::new(ManualClock::new(TIME));
        let chain = Arc::new(MemoryChain::new(TIP, TIME));
        chain.set_subsidy(50 * COIN);
        let engine = CommitmentEngine::open(
            config,
            chain.clone(),
            Arc::new(ScriptedSource::new()),
            clock.clone(),
        )
        .unwrap();

        let oracle = engine.oracle();
        oracle.set_price(Asset::Native, fx("0.00000025"), TIME);
        oracle.set_price(Asset::Dash, fx("0.0025"), TIME);
        oracle.set_price(Asset::Btc, fx("40000"), TIME);

        Self {
            _dir: dir,
            chain,
            clock,
            engine,
            funded: AtomicU32::new(0),
        }
    }

    /// Confirm `tx` at the tip and connect it
    pub fn confirm(&self, tx: &Transaction) -> BlockSummary {
        self.chain.add_confirmed(tx.clone(), TIP, TIME);
        self.engine
            .connect_block(std::slice::from_ref(tx), TIP, TIME)
            .unwrap()
    }

    pub fn whale_options(&self, coins: i64, duration_days: i64) -> WhaleStakeOptions {
        WhaleStakeOptions {
            return_address: return_address(),
            owner_key: "owner".into(),
            amount: coins * COIN,
            duration_days,
        }
    }

    /// Unspent native output owned by `native_key`
    pub fn fund_native(&self, coins: i64) -> String {
        let n = self.funded.fetch_add(1, Ordering::SeqCst);
        let outpoint = OutPoint::new(TxId::from_content(format!("native-{n}").as_bytes()), 0);
        let owner = native_key()
            .address(self.engine.params().native_address_version)
            .to_string();
        self.chain.add_unspent(outpoint, TxOut::new(owner, coins * COIN));
        outpoint.to_string()
    }

    /// Dash output owned by `dash_key`, freshly indexed by the oracle
    pub fn fund_dash(&self, coins: &str, spent: bool) -> String {
        let n = self.funded.fetch_add(1, Ordering::SeqCst);
        let id = format!("{}-0", TxId::from_content(format!("dash-{n}").as_bytes()));
        self.index_dash(&id, coins, spent);
        id
    }

    pub fn index_dash(&self, id: &str, coins: &str, spent: bool) {
        let owner = dash_key()
            .address(self.engine.params().dash_address_version)
            .to_string();
        self.engine.oracle().ingest_utxos(
            &format!(
                "<utxo><hash>{id}</hash><amount>{coins}</amount><address>{owner}</address>\
                 <network>dash</network><spent>{}</spent></utxo>",
                u8::from(spent)
            ),
            TIME,
        );
    }

    pub fn dash_options<'a>(
        &self,
        native_utxo: &str,
        dash_utxo: &str,
        native: &'a KeyPair,
        dash: &'a KeyPair,
    ) -> DashStakeOptions<'a> {
        DashStakeOptions {
            return_address: return_address(),
            owner_key: "owner".into(),
            duration_days: 180,
            native_utxo: native_utxo.into(),
            dash_utxo: dash_utxo.into(),
            native_key: native,
            dash_key: dash,
        }
    }
}
