//! Commitment engine
//!
//! Owns the application cache, the oracle cache and the stake registry for one
//! ledger, and exposes the operations a node calls: block connect, mempool
//! admission, payout selection, stake request construction and vote tallies.

use crate::config::NodeConfig;
use crate::error::{NodeError, Result};
use anyhow::Context;
use covenant_core::{ChainView, Clock, Fixed, Height, OutPoint, Timestamp, Transaction};
use covenant_crypto::{Address, KeyPair};
use covenant_economics::constants::{
    DASH_MAX_DAYS, DASH_MIN_DAYS, WHALE_MAX_AMOUNT, WHALE_MAX_DAYS, WHALE_MIN_AMOUNT,
    WHALE_MIN_DAYS,
};
use covenant_economics::{
    CoinAgeLedger, CoinAgeTally, ConsensusParams, DashStake, DashStakeRequest, PayoutSchedule,
    PayoutSelector, StakeContext, StakeKind, StakeRegistry, StakeValidator, ValidationContext,
    Verdict, WhaleStakeRequest, YieldEngine, YieldMetric,
};
use covenant_oracle::{Asset, OracleCache, OracleSource, RefreshOutcome};
use covenant_storage::{load_snapshot, save_snapshot, ApplicationCache, KeyedCache};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What connecting one block recorded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub height: Height,
    /// Stake transactions memorised
    pub stakes: usize,
    /// Coin-age votes recorded
    pub votes: usize,
    /// Rows written when this block triggered a checkpoint
    pub checkpoint_rows: Option<usize>,
}

/// Arguments for a new whale stake
#[derive(Clone, Debug)]
pub struct WhaleStakeOptions {
    pub return_address: String,
    pub owner_key: String,
    /// Base units burned
    pub amount: covenant_core::Amount,
    pub duration_days: i64,
}

/// Arguments for a new dash stake. The keys must own the two UTXOs.
pub struct DashStakeOptions<'a> {
    pub return_address: String,
    pub owner_key: String,
    pub duration_days: i64,
    /// Native `<txid>-<n>`
    pub native_utxo: String,
    /// Dash `<txid>-<n>`, as indexed by the oracle
    pub dash_utxo: String,
    pub native_key: &'a KeyPair,
    pub dash_key: &'a KeyPair,
}

#[derive(Debug)]
struct CheckpointState {
    height: Height,
    blocks_since: u64,
}

/// The stake pipeline for one ledger
pub struct CommitmentEngine {
    config: NodeConfig,
    chain: Arc<dyn ChainView>,
    cache: Arc<ApplicationCache>,
    oracle: Arc<OracleCache>,
    source: Arc<dyn OracleSource>,
    registry: StakeRegistry,
    votes: CoinAgeLedger,
    checkpoint: Mutex<CheckpointState>,
}

impl CommitmentEngine {
    /// Build the caches and restore the last snapshot
    pub fn open(
        config: NodeConfig,
        chain: Arc<dyn ChainView>,
        source: Arc<dyn OracleSource>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let snapshot = config.snapshot_path();
        if let Some(dir) = snapshot.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating data directory {}", dir.display()))?;
        }

        let cache = Arc::new(ApplicationCache::new(clock.clone()));
        let mut height = 0;
        if config.cache.load_on_open {
            let restored = load_snapshot(&*cache, &snapshot)
                .with_context(|| format!("loading snapshot {}", snapshot.display()))?;
            if let Some(summary) = restored {
                info!(
                    rows = summary.rows,
                    skipped = summary.skipped,
                    height = summary.height,
                    "Restored application cache"
                );
                height = summary.height;
            }
        }

        let oracle = Arc::new(OracleCache::new(config.oracle.clone(), clock));
        let registry = StakeRegistry::new(StakeContext::new(
            config.consensus.clone(),
            config.staking.clone(),
            chain.clone(),
            cache.clone(),
            oracle.clone(),
        ));
        let votes = CoinAgeLedger::new(cache.clone());

        info!(
            network = %config.consensus.network,
            dash_stakes = config.staking.dash_stake_enabled,
            "Commitment engine open"
        );
        Ok(Self {
            config,
            chain,
            cache,
            oracle,
            source,
            registry,
            votes,
            checkpoint: Mutex::new(CheckpointState {
                height,
                blocks_since: 0,
            }),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.config.consensus
    }

    pub fn registry(&self) -> &StakeRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &dyn KeyedCache {
        &*self.cache
    }

    pub fn oracle(&self) -> &OracleCache {
        &self.oracle
    }

    /// Height of the last connected or restored block
    pub fn last_height(&self) -> Height {
        self.checkpoint.lock().height
    }

    // === Blocks ===

    /// Memorise stakes and votes of a connected block, checkpointing the cache
    /// every `checkpoint_interval` blocks
    pub fn connect_block(
        &self,
        txs: &[Transaction],
        height: Height,
        block_time: Timestamp,
    ) -> Result<BlockSummary> {
        let stakes = self.registry.memorize_block(txs, height, block_time);
        let votes = self.votes.memorize_block(&*self.chain, txs, block_time);

        let interval = self.config.cache.checkpoint_interval;
        let mut state = self.checkpoint.lock();
        state.height = height;
        state.blocks_since += 1;
        let checkpoint_rows = if interval > 0 && state.blocks_since >= interval {
            state.blocks_since = 0;
            Some(save_snapshot(&*self.cache, &self.config.snapshot_path(), height)?)
        } else {
            None
        };

        debug!(height, stakes, votes, "Block connected");
        Ok(BlockSummary {
            height,
            stakes,
            votes,
            checkpoint_rows,
        })
    }

    /// Write the final snapshot
    pub fn shutdown(&self) -> Result<usize> {
        let height = self.checkpoint.lock().height;
        let rows = save_snapshot(&*self.cache, &self.config.snapshot_path(), height)?;
        info!(height, rows, "Commitment engine stopped");
        Ok(rows)
    }

    // === Admission and queries ===

    /// Check a candidate transaction against the current tip
    pub fn validate_transaction(&self, tx: &Transaction) -> Result<Verdict> {
        let ctx = ValidationContext::from_chain(&*self.chain);
        Ok(StakeValidator::new(&self.registry).validate(tx, &ctx)?)
    }

    /// Yield metric at the tip, pending stakes included
    pub fn metric(&self, kind: StakeKind) -> YieldMetric {
        YieldEngine::new(&self.registry).metric(kind, self.chain.tip_height(), true, None)
    }

    pub fn offered_rate(&self, kind: StakeKind) -> Fixed {
        self.metric(kind).offered_rate
    }

    pub fn payouts_at(&self, kind: StakeKind, height: Height) -> PayoutSchedule {
        PayoutSelector::new(&self.registry).payouts_at(kind, height)
    }

    /// Whale then dash payouts settled at `height`
    pub fn payouts(&self, height: Height) -> Vec<PayoutSchedule> {
        let selector = PayoutSelector::new(&self.registry);
        vec![selector.whale_payouts(height), selector.dash_payouts(height)]
    }

    pub fn dash_stake_by_utxo(&self, utxo: &str) -> Option<DashStake> {
        self.registry.dash_stake_by_utxo(utxo)
    }

    /// Native outpoints the wallet must not spend
    pub fn locked_outpoints(&self) -> Vec<OutPoint> {
        self.registry.locked_outpoints(self.chain.tip_height())
    }

    pub fn vote_tally(&self, gobject: &str) -> CoinAgeTally {
        self.votes.tally(gobject)
    }

    // === Oracle ===

    /// One rate-limited oracle round-trip
    pub async fn refresh_oracle(&self) -> Result<RefreshOutcome> {
        let height = self.chain.tip_height();
        Ok(self.oracle.refresh(&*self.source, height).await?)
    }

    /// Refresh the oracle every interval until `shutdown` turns true
    pub async fn run_oracle_refresh(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.oracle.refresh_interval_secs.max(1) as u64;
        let mut ticker = tokio::time::interval(Duration::from_secs(period));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh_oracle().await {
                        warn!(error = %e, "Oracle refresh failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Oracle refresh task stopping");
                        return;
                    }
                }
            }
        }
    }

    // === Stake construction ===

    /// Whale stake at the current offered rate, refused while the owner has
    /// too much pending
    pub fn prepare_whale_stake(&self, options: WhaleStakeOptions) -> Result<WhaleStakeRequest> {
        let policy = &self.config.staking;
        let pending = self
            .registry
            .whale_stakes_in_mempool(Some(&options.owner_key));
        if pending > policy.max_pending_whale {
            return Err(NodeError::PendingLimit {
                owner: options.owner_key,
                pending,
                limit: policy.max_pending_whale,
            });
        }
        if !(WHALE_MIN_DAYS..=WHALE_MAX_DAYS).contains(&options.duration_days) {
            return Err(NodeError::InvalidRequest(format!(
                "duration must be {WHALE_MIN_DAYS}-{WHALE_MAX_DAYS} days"
            )));
        }
        if !(WHALE_MIN_AMOUNT..=WHALE_MAX_AMOUNT).contains(&options.amount) {
            return Err(NodeError::InvalidRequest(format!(
                "amount {} outside stake bounds",
                Fixed::from_amount(options.amount)
            )));
        }
        self.check_return_address(&options.return_address)?;

        let rate = self.offered_rate(StakeKind::Whale);
        if !rate.is_positive() {
            return Err(NodeError::Saturated(StakeKind::Whale.to_string()));
        }
        let request = WhaleStakeRequest {
            return_address: options.return_address,
            owner_key: options.owner_key,
            amount: options.amount,
            duration_days: options.duration_days,
            burn_height: self.chain.tip_height(),
            burn_time: self.chain.adjusted_time(),
            rate,
        };
        info!(
            amount = %Fixed::from_amount(request.amount),
            days = request.duration_days,
            %rate,
            "Prepared whale stake"
        );
        Ok(request)
    }

    /// Signed dash stake valued at the cached oracle prices
    pub fn prepare_dash_stake(&self, options: DashStakeOptions<'_>) -> Result<DashStakeRequest> {
        let params = &self.config.consensus;
        if !self.config.staking.dash_stake_enabled {
            return Err(NodeError::DashStakeDisabled);
        }
        if !(DASH_MIN_DAYS..=DASH_MAX_DAYS).contains(&options.duration_days) {
            return Err(NodeError::InvalidRequest(format!(
                "duration must be {DASH_MIN_DAYS}-{DASH_MAX_DAYS} days"
            )));
        }
        self.check_return_address(&options.return_address)?;

        let outpoint = OutPoint::parse(&options.native_utxo)?;
        let native = self.chain.unspent_output(&outpoint).ok_or_else(|| {
            NodeError::InvalidRequest(format!("native utxo {outpoint} is spent or unknown"))
        })?;
        let native_address = options.native_key.address(params.native_address_version).to_string();
        if native.address != native_address {
            return Err(NodeError::InvalidRequest(format!(
                "native utxo {outpoint} is not owned by the signing key"
            )));
        }

        let dash = self.oracle.query_utxo(&options.dash_utxo).fresh().ok_or_else(|| {
            NodeError::InvalidRequest(format!("dash utxo {} not freshly indexed", options.dash_utxo))
        })?;
        if dash.spent {
            return Err(NodeError::InvalidRequest(format!("dash utxo {} is spent", dash.id)));
        }
        let dash_address = options.dash_key.address(params.dash_address_version).to_string();
        if dash.address != dash_address {
            return Err(NodeError::InvalidRequest(format!(
                "dash utxo {} is not owned by the signing key",
                dash.id
            )));
        }

        let tip = self.chain.tip_height();
        for utxo in [&options.native_utxo, &options.dash_utxo] {
            if self.registry.is_duplicate_utxo(utxo, None, tip) {
                return Err(NodeError::InvalidRequest(format!("{utxo} is already pledged")));
            }
        }

        let native_price = self.fresh_price(Asset::Native)?;
        let dash_price = self.fresh_price(Asset::Dash)?;
        let btc_price = self.fresh_price(Asset::Btc)?;
        let rate = self.offered_rate(StakeKind::Dash);
        if !rate.is_positive() {
            return Err(NodeError::Saturated(StakeKind::Dash.to_string()));
        }

        let request = DashStakeRequest {
            return_address: options.return_address,
            owner_key: options.owner_key,
            duration_days: options.duration_days,
            height: tip,
            time: self.chain.adjusted_time(),
            rate,
            native_utxo: options.native_utxo,
            dash_utxo: options.dash_utxo,
            native_price,
            dash_price,
            btc_price,
            native_value_usd: (Fixed::from_amount(native.value) * native_price * btc_price)
                .round_dp(2),
            dash_value_usd: (Fixed::from_amount(dash.amount) * dash_price * btc_price).round_dp(2),
            native_amount: native.value,
            dash_amount: dash.amount,
            ..DashStakeRequest::default()
        }
        .sign(options.native_key, options.dash_key)?;

        info!(
            native = %request.native_utxo,
            dash = %request.dash_utxo,
            days = request.duration_days,
            %rate,
            "Prepared dash stake"
        );
        Ok(request)
    }

    fn check_return_address(&self, address: &str) -> Result<()> {
        if Address::is_valid(address, self.config.consensus.native_address_version) {
            Ok(())
        } else {
            Err(NodeError::InvalidRequest(format!("invalid return address {address}")))
        }
    }

    fn fresh_price(&self, asset: Asset) -> Result<Fixed> {
        self.oracle
            .price(asset)
            .fresh()
            .ok_or_else(|| NodeError::InvalidRequest(format!("no fresh {asset} price")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::{ManualClock, MemoryChain, COIN};
    use covenant_economics::constants::WHALE_BURN_SECTION;
    use covenant_oracle::ScriptedSource;

    const TIP: Height = 250_000;
    const TIME: Timestamp = 1_700_000_000;

    struct Setup {
        _dir: tempfile::TempDir,
        config: NodeConfig,
        chain: Arc<MemoryChain>,
        clock: Arc<ManualClock>,
        source: Arc<ScriptedSource>,
    }

    impl Setup {
        fn new(checkpoint_interval: u64) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let mut config = NodeConfig::default();
            config.node.data_dir = dir.path().join("data").display().to_string();
            config.cache.checkpoint_interval = checkpoint_interval;
            let chain = Arc::new(MemoryChain::new(TIP, TIME));
            chain.set_subsidy(50 * COIN);
            Self {
                _dir: dir,
                config,
                chain,
                clock: Arc::new(ManualClock::new(TIME)),
                source: Arc::new(ScriptedSource::new()),
            }
        }

        fn open(&self) -> CommitmentEngine {
            CommitmentEngine::open(
                self.config.clone(),
                self.chain.clone(),
                self.source.clone(),
                self.clock.clone(),
            )
            .unwrap()
        }
    }

    fn return_address() -> String {
        KeyPair::from_secret_bytes(&[7u8; 32])
            .unwrap()
            .address(covenant_crypto::NATIVE_ADDRESS_VERSION)
            .to_string()
    }

    fn whale_options(owner: &str) -> WhaleStakeOptions {
        WhaleStakeOptions {
            return_address: return_address(),
            owner_key: owner.into(),
            amount: 1_000 * COIN,
            duration_days: 365,
        }
    }

    #[test]
    fn test_prepared_whale_stake_is_memorised_and_restored() {
        let setup = Setup::new(0);
        let engine = setup.open();
        let request = engine.prepare_whale_stake(whale_options("alice")).unwrap();
        assert_eq!(request.burn_height, TIP);
        assert!(request.rate.is_positive());

        let tx = request.transaction(engine.params(), vec![]);
        setup.chain.add_confirmed(tx.clone(), TIP, TIME);
        let summary = engine.connect_block(std::slice::from_ref(&tx), TIP, TIME).unwrap();
        assert_eq!(summary.stakes, 1);
        assert_eq!(summary.checkpoint_rows, None);
        assert!(engine.shutdown().unwrap() >= 1);

        let reopened = setup.open();
        assert_eq!(reopened.last_height(), TIP);
        assert!(reopened
            .cache()
            .read(WHALE_BURN_SECTION, &tx.txid.to_hex())
            .is_some());
        let stakes = reopened.registry().whale_stakes(false);
        assert_eq!(stakes.len(), 1);
        assert_eq!(stakes[0].txid, tx.txid);
    }

    #[test]
    fn test_checkpoint_every_interval() {
        let setup = Setup::new(2);
        let engine = setup.open();
        let first = engine.connect_block(&[], TIP + 1, TIME).unwrap();
        assert_eq!(first.checkpoint_rows, None);
        assert!(!setup.config.snapshot_path().exists());

        let second = engine.connect_block(&[], TIP + 2, TIME).unwrap();
        assert_eq!(second.checkpoint_rows, Some(0));
        assert!(setup.config.snapshot_path().exists());
        assert_eq!(engine.last_height(), TIP + 2);
    }

    #[test]
    fn test_pending_whale_limit() {
        let setup = Setup::new(0);
        let engine = setup.open();
        let mut options = whale_options("bob");
        options.amount = 200_000 * COIN;
        let request = engine.prepare_whale_stake(options).unwrap();
        setup
            .chain
            .add_to_mempool(request.transaction(engine.params(), vec![]));

        // Principal plus a year's reward is over the pending limit
        let err = engine.prepare_whale_stake(whale_options("bob")).unwrap_err();
        assert!(matches!(err, NodeError::PendingLimit { .. }), "{err}");
        assert!(err.is_recoverable());
        // Other owners are unaffected
        assert!(engine.prepare_whale_stake(whale_options("carol")).is_ok());
    }

    #[test]
    fn test_whale_request_bounds() {
        let setup = Setup::new(0);
        let engine = setup.open();
        let mut short = whale_options("dave");
        short.duration_days = 3;
        assert!(matches!(
            engine.prepare_whale_stake(short),
            Err(NodeError::InvalidRequest(_))
        ));
        let mut bad_address = whale_options("dave");
        bad_address.return_address = "not-an-address".into();
        assert!(matches!(
            engine.prepare_whale_stake(bad_address),
            Err(NodeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_dash_stake_requires_switch() {
        let setup = Setup::new(0);
        let engine = setup.open();
        let key = KeyPair::from_secret_bytes(&[1u8; 32]).unwrap();
        let err = engine
            .prepare_dash_stake(DashStakeOptions {
                return_address: return_address(),
                owner_key: "erin".into(),
                duration_days: 180,
                native_utxo: String::new(),
                dash_utxo: String::new(),
                native_key: &key,
                dash_key: &key,
            })
            .unwrap_err();
        assert!(matches!(err, NodeError::DashStakeDisabled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_task_fills_oracle_and_stops() {
        let setup = Setup::new(0);
        setup.source.set_utxos(format!(
            "<utxo><hash>{}-0</hash><amount>10</amount><address>X</address>\
             <network>dash</network><spent>0</spent></utxo>",
            "ab".repeat(32)
        ));
        setup.source.set_price(Asset::Btc, "40000");
        let engine = Arc::new(setup.open());

        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(engine.clone().run_oracle_refresh(stopped));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.oracle().utxo_count(), 1);
        assert!(engine.oracle().price(Asset::Btc).is_fresh());

        stop.send(true).unwrap();
        task.await.unwrap();
    }
}
