//! Shared unit-test harness

use crate::params::{ConsensusParams, StakingPolicy};
use crate::registry::{StakeContext, StakeRegistry};
use crate::stake::{DashStakeRequest, WhaleStakeRequest};
use covenant_core::{
    Fixed, Height, ManualClock, MemoryChain, OutPoint, Timestamp, Transaction, TxId, TxOut, COIN,
};
use covenant_crypto::KeyPair;
use covenant_oracle::{Asset, OracleCache, OracleSettings};
use covenant_storage::ApplicationCache;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Tip used by every harness; past both budget switch heights on mainnet
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

pub struct DashPledge {
    pub request: DashStakeRequest,
    pub native_address: String,
    pub dash_address: String,
}

pub struct Harness {
    pub params: ConsensusParams,
    pub chain: Arc<MemoryChain>,
    pub cache: Arc<ApplicationCache>,
    pub oracle: Arc<OracleCache>,
    pub clock: Arc<ManualClock>,
    pub registry: StakeRegistry,
    pledges: AtomicU32,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_params(ConsensusParams::mainnet())
    }

    pub fn with_params(params: ConsensusParams) -> Self {
        let clock = Arc::new(ManualClock::new(TIME));
        let chain = Arc::new(MemoryChain::new(TIP, TIME));
        chain.set_subsidy(50 * COIN);
        let cache = Arc::new(ApplicationCache::new(clock.clone()));
        let oracle = Arc::new(OracleCache::new(OracleSettings::default(), clock.clone()));
        oracle.set_price(Asset::Native, fx("0.00000025"), TIME);
        oracle.set_price(Asset::Dash, fx("0.0025"), TIME);
        oracle.set_price(Asset::Btc, fx("40000"), TIME);

        let policy = StakingPolicy {
            dash_stake_enabled: true,
            ..StakingPolicy::default()
        };
        let registry = StakeRegistry::new(StakeContext::new(
            params.clone(),
            policy,
            chain.clone(),
            cache.clone(),
            oracle.clone(),
        ));
        Self {
            params,
            chain,
            cache,
            oracle,
            clock,
            registry,
            pledges: AtomicU32::new(0),
        }
    }

    /// Confirm `tx` at `height` and memorize it
    pub fn confirm(&self, tx: &Transaction, height: Height) {
        self.chain.add_confirmed(tx.clone(), height, TIME);
        self.registry
            .memorize_block(std::slice::from_ref(tx), height, TIME);
    }

    pub fn whale_request(&self, coins: i64, duration_days: i64, rate: Fixed) -> WhaleStakeRequest {
        WhaleStakeRequest {
            return_address: return_address(),
            owner_key: "owner".into(),
            amount: coins * COIN,
            duration_days,
            burn_height: TIP,
            burn_time: TIME,
            rate,
        }
    }

    /// 180-day pledge at the maximum dash rate
    pub fn dash_pledge(&self, native_coins: i64, dash_coins: i64) -> DashPledge {
        self.dash_pledge_with(native_coins, &dash_coins.to_string(), 180)
    }

    /// Register both backing UTXOs and build a signed request valued at the
    /// harness prices
    pub fn dash_pledge_with(&self, native_coins: i64, dash_coins: &str, duration_days: i64) -> DashPledge {
        let n = self.pledges.fetch_add(1, Ordering::SeqCst);
        let native = native_key();
        let dash = dash_key();
        let native_address = native.address(self.params.native_address_version).to_string();
        let dash_address = dash.address(self.params.dash_address_version).to_string();

        let outpoint = OutPoint::new(TxId::from_content(format!("native-{n}").as_bytes()), 0);
        self.chain.add_unspent(
            outpoint,
            TxOut::new(native_address.clone(), native_coins * COIN),
        );
        let dash_utxo = format!("{}-0", TxId::from_content(format!("dash-{n}").as_bytes()));
        self.oracle.ingest_utxos(
            &format!(
                "<utxo><hash>{dash_utxo}</hash><amount>{dash_coins}</amount>\
                 <address>{dash_address}</address><network>dash</network><spent>0</spent></utxo>"
            ),
            TIME,
        );

        let native_price = fx("0.00000025");
        let dash_price = fx("0.0025");
        let btc_price = fx("40000");
        let dash_amount = fx(dash_coins);
        let request = DashStakeRequest {
            return_address: return_address(),
            owner_key: "owner".into(),
            duration_days,
            height: TIP,
            time: TIME,
            rate: fx("0.2"),
            native_utxo: outpoint.to_string(),
            dash_utxo,
            native_price,
            dash_price,
            btc_price,
            native_value_usd: (Fixed::from_int(native_coins) * native_price * btc_price).round_dp(2),
            dash_value_usd: (dash_amount * dash_price * btc_price).round_dp(2),
            native_amount: native_coins * COIN,
            dash_amount: dash_amount.to_amount(),
            ..DashStakeRequest::default()
        }
        .sign(&native, &dash)
        .unwrap();

        DashPledge {
            request,
            native_address,
            dash_address,
        }
    }
}
