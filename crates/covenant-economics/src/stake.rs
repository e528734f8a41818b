//! Stake records and their on-chain payloads
//!
//! A stake is a transaction paying the burn address whose burn output carries
//! a tagged payload. Parsing never fails: a payload that does not decode
//! yields a record with `found == false` and the issues that caused it.

use crate::constants::*;
use crate::params::ConsensusParams;
use crate::scaling::{owed_amount, scaled_yield, tag_payout};
use covenant_core::{
    extract_tag, Amount, ChainView, FieldReader, Fixed, Height, OutPoint, PayloadBuilder,
    Timestamp, Transaction, TxId, TxIn, TxMessage, TxOut, COIN, SECONDS_PER_DAY,
};
use covenant_crypto::{sign_utxo, verify_utxo_signature, Address, KeyPair};
use covenant_oracle::OracleCache;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stake flavour
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeKind {
    /// Native coins burned for a single payout at maturity
    Whale,
    /// Native and Dash UTXOs pledged for monthly payouts
    Dash,
}

impl StakeKind {
    /// Cache section remembering confirmed stakes of this kind
    pub fn section(&self) -> &'static str {
        match self {
            Self::Whale => WHALE_BURN_SECTION,
            Self::Dash => DASH_BURN_SECTION,
        }
    }

    /// `<MT>` of the envelope
    pub fn message_kind(&self) -> &'static str {
        match self {
            Self::Whale => WHALE_MESSAGE_KIND,
            Self::Dash => DASH_MESSAGE_KIND,
        }
    }

    /// Kind announced by the burn output of `tx`, if any
    pub fn of_transaction(tx: &Transaction, params: &ConsensusParams) -> Option<Self> {
        let (_, burn) = tx.output_to(&params.burn_address)?;
        let envelope = TxMessage::decode(&burn.message);
        [Self::Whale, Self::Dash]
            .into_iter()
            .find(|kind| envelope.kind == kind.message_kind())
    }
}

impl fmt::Display for StakeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whale => write!(f, "whale"),
            Self::Dash => write!(f, "dash"),
        }
    }
}

/// Burn output of `tx` and the inner payload wrapped in `<wrapper>`
fn stake_payload<'a>(
    tx: &'a Transaction,
    params: &ConsensusParams,
    kind: StakeKind,
    wrapper: &str,
) -> Option<(&'a TxOut, String)> {
    let (_, burn) = tx.output_to(&params.burn_address)?;
    let envelope = TxMessage::decode(&burn.message);
    if envelope.kind != kind.message_kind() {
        return None;
    }
    let inner = extract_tag(&envelope.value, wrapper);
    let payload = if inner.is_empty() {
        envelope.value.clone()
    } else {
        inner.to_string()
    };
    Some((burn, payload))
}

// === Whale ===

/// Single-asset stake reconstructed from its transaction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WhaleStake {
    pub txid: TxId,
    pub found: bool,
    pub return_address: String,
    /// Owner public key as written in the payload
    pub owner_key: String,
    /// Burned base units
    pub amount: Amount,
    pub duration_days: i64,
    pub burn_height: Height,
    pub burn_time: Timestamp,
    /// Rate written by the staker
    pub claimed_rate: Fixed,
    /// Claimed rate scaled by commitment length
    pub actual_rate: Fixed,
    /// Reward in coins
    pub reward: Fixed,
    /// Principal plus reward, rounded and tagged, in coins
    pub total_owed: Fixed,
    pub maturity_height: Height,
    pub maturity_time: Timestamp,
    /// Decoding problems, rendered
    pub issues: Vec<String>,
}

impl WhaleStake {
    pub fn coins(&self) -> Fixed {
        Fixed::from_amount(self.amount)
    }
}

/// Reconstruct a whale stake from `tx`
pub fn parse_whale_stake(tx: &Transaction, params: &ConsensusParams) -> WhaleStake {
    let mut stake = WhaleStake {
        txid: tx.txid,
        ..Default::default()
    };
    let Some((burn, payload)) = stake_payload(tx, params, StakeKind::Whale, "dws") else {
        return stake;
    };

    let mut fields = FieldReader::new(&payload);
    stake.burn_time = fields.integer("burntime").unwrap_or(0);
    stake.burn_height = fields.integer("burnheight").unwrap_or(0);
    stake.duration_days = fields.integer("duration").unwrap_or(0);
    stake.claimed_rate = fields.decimal("dwu", 4).unwrap_or(Fixed::ZERO);
    stake.return_address = fields.text("returnaddress").unwrap_or_default().trim().to_string();
    stake.owner_key = fields.optional_text("cpk").trim().to_string();
    stake.issues = fields.finish().iter().map(ToString::to_string).collect();
    stake.amount = burn.value;

    let max_rate = params.max_whale_rate_at(stake.burn_height);
    if stake.claimed_rate > max_rate || stake.claimed_rate.is_negative() {
        stake.claimed_rate = Fixed::ZERO;
    }
    stake.actual_rate = scaled_yield(stake.duration_days, stake.claimed_rate, max_rate);
    stake.reward = owed_amount(stake.duration_days, stake.actual_rate, stake.coins());
    stake.total_owed = tag_payout(stake.coins() + stake.reward, WHALE_PAYOUT_TAG);
    stake.maturity_height = stake.burn_height + stake.duration_days * params.blocks_per_day;
    stake.maturity_time = stake.burn_time + stake.duration_days * SECONDS_PER_DAY;

    stake.found = stake.issues.is_empty()
        && Address::is_valid(&stake.return_address, params.native_address_version)
        && stake.burn_height > 0
        && stake.duration_days > 0
        && stake.amount > 0;
    stake
}

/// Parameters of a whale stake to be broadcast
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhaleStakeRequest {
    pub return_address: String,
    pub owner_key: String,
    /// Base units to burn
    pub amount: Amount,
    pub duration_days: i64,
    pub burn_height: Height,
    pub burn_time: Timestamp,
    pub rate: Fixed,
}

impl WhaleStakeRequest {
    /// Time the principal and reward fall due
    pub fn reclaim_time(&self) -> Timestamp {
        self.burn_time + self.duration_days * SECONDS_PER_DAY
    }

    /// `<dws>..</dws>` payload
    pub fn payload(&self) -> String {
        let due_date = chrono::DateTime::from_timestamp(self.reclaim_time(), 0)
            .map(|d| d.format("%m-%d-%Y").to_string())
            .unwrap_or_default();
        PayloadBuilder::new()
            .field("returnaddress", &self.return_address)
            .field("burnheight", self.burn_height)
            .field("cpk", &self.owner_key)
            .field("burntime", self.burn_time)
            .field("dwu", self.rate.to_string_dp(4))
            .field("duration", self.duration_days)
            .field("duedate", due_date)
            .field("amount", Fixed::from_amount(self.amount).to_string_dp(2))
            .wrap("dws")
    }

    /// Full output message with the `DWS` envelope
    pub fn message(&self) -> String {
        let key = format!(
            "{}-{}-{}",
            WHALE_MESSAGE_KIND,
            self.return_address,
            self.reclaim_time()
        );
        TxMessage::encode(WHALE_MESSAGE_KIND, &key, &self.payload())
    }

    pub fn burn_output(&self, params: &ConsensusParams) -> TxOut {
        TxOut::new(params.burn_address.clone(), self.amount).with_message(self.message())
    }

    pub fn transaction(&self, params: &ConsensusParams, inputs: Vec<TxIn>) -> Transaction {
        Transaction::new(inputs, vec![self.burn_output(params)])
    }
}

// === Dash ===

/// Dual-asset stake reconstructed from its transaction, with both backing
/// UTXOs resolved against the ledger and the oracle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DashStake {
    pub txid: TxId,
    pub found: bool,
    pub return_address: String,
    pub owner_key: String,
    pub duration_days: i64,
    pub burn_height: Height,
    pub burn_time: Timestamp,
    pub claimed_rate: Fixed,
    pub actual_rate: Fixed,
    /// `<txid>-<index>` on the native ledger
    pub native_utxo: String,
    /// `<txid>-<index>` on the Dash ledger
    pub dash_utxo: String,
    pub native_signature: String,
    pub dash_signature: String,
    /// Claimed quotes: native and Dash in BTC, BTC in USD
    pub native_price: Fixed,
    pub dash_price: Fixed,
    pub btc_price: Fixed,
    /// Claimed USD values of each side
    pub native_value_usd: Fixed,
    pub dash_value_usd: Fixed,
    pub claimed_native_amount: Amount,
    pub claimed_dash_amount: Amount,
    /// Resolved unspent amounts; zero when spent or unknown
    pub native_amount: Amount,
    pub dash_amount: Amount,
    /// Owners of the resolved UTXOs
    pub native_address: String,
    pub dash_address: String,
    pub native_signature_valid: bool,
    pub dash_signature_valid: bool,
    /// Native coins the pair actually backs
    pub quantity: Fixed,
    /// Coins paid each month, rounded and tagged
    pub monthly_earnings: Fixed,
    pub maturity_height: Height,
    pub maturity_time: Timestamp,
    pub spent: bool,
    pub issues: Vec<String>,
}

impl DashStake {
    pub fn native_coins(&self) -> Fixed {
        Fixed::from_amount(self.native_amount)
    }

    pub fn dash_coins(&self) -> Fixed {
        Fixed::from_amount(self.dash_amount)
    }

    pub fn signatures_valid(&self) -> bool {
        self.native_signature_valid && self.dash_signature_valid
    }

    /// Monthly anniversaries of the burn height up to maturity
    pub fn anniversaries(&self, params: &ConsensusParams) -> Vec<Height> {
        let month = params.blocks_per_month();
        if month <= 0 {
            return Vec::new();
        }
        (1..)
            .map(|k| self.burn_height + k * month)
            .take_while(|h| *h <= self.maturity_height)
            .collect()
    }

    /// True while the maturity height has not been reached
    pub fn is_live_at(&self, height: Height) -> bool {
        self.maturity_height > height
    }
}

/// Native coins deliverable by the pair: the smaller USD side converted at
/// the claimed prices, never more than the native UTXO holds
fn deliverable_quantity(stake: &DashStake) -> Fixed {
    let resolved = stake.native_coins();
    let usd = stake.native_value_usd.min(stake.dash_value_usd);
    match usd.checked_div(stake.btc_price * stake.native_price) {
        Some(quantity) => quantity.min(resolved),
        None => resolved,
    }
}

/// Reconstruct a dash stake from `tx`. The native UTXO is resolved through
/// the ledger, the Dash UTXO through the oracle cache (stale data allowed).
pub fn parse_dash_stake(
    tx: &Transaction,
    params: &ConsensusParams,
    chain: &dyn ChainView,
    oracle: &OracleCache,
) -> DashStake {
    let mut stake = DashStake {
        txid: tx.txid,
        ..Default::default()
    };
    let Some((_, payload)) = stake_payload(tx, params, StakeKind::Dash, "dashstake") else {
        return stake;
    };

    let mut fields = FieldReader::new(&payload);
    stake.burn_time = fields.integer("time").unwrap_or(0);
    stake.burn_height = fields.integer("height").unwrap_or(0);
    stake.duration_days = fields.integer("duration").unwrap_or(0);
    stake.claimed_rate = fields.decimal("dwu", 4).unwrap_or(Fixed::ZERO);
    stake.return_address = fields.text("returnaddress").unwrap_or_default().trim().to_string();
    stake.owner_key = fields.optional_text("cpk").trim().to_string();
    stake.native_utxo = fields.text("nativeutxo").unwrap_or_default().trim().to_string();
    stake.dash_utxo = fields.text("dashutxo").unwrap_or_default().trim().to_string();
    stake.native_signature = fields.text("nativesig").unwrap_or_default().trim().to_string();
    stake.dash_signature = fields.text("dashsig").unwrap_or_default().trim().to_string();
    stake.native_price = fields.decimal("nativeprice", 12).unwrap_or(Fixed::ZERO);
    stake.dash_price = fields.decimal("dashprice", 12).unwrap_or(Fixed::ZERO);
    stake.btc_price = fields.decimal("btcprice", 12).unwrap_or(Fixed::ZERO);
    stake.native_value_usd = fields.decimal("nativevalue", 2).unwrap_or(Fixed::ZERO);
    stake.dash_value_usd = fields.decimal("dashvalue", 2).unwrap_or(Fixed::ZERO);
    stake.claimed_native_amount = fields
        .decimal("nativeamount", 8)
        .map(Fixed::to_amount)
        .unwrap_or(0);
    stake.claimed_dash_amount = fields
        .decimal("dashamount", 8)
        .map(Fixed::to_amount)
        .unwrap_or(0);
    stake.issues = fields.finish().iter().map(ToString::to_string).collect();

    if let Some(output) = OutPoint::parse(&stake.native_utxo)
        .ok()
        .and_then(|outpoint| chain.unspent_output(&outpoint))
    {
        stake.native_amount = output.value;
        stake.native_address = output.address;
    }
    let (dash_amount, dash_address) = oracle.resolve_amount(&stake.dash_utxo);
    stake.dash_amount = dash_amount;
    stake.dash_address = dash_address;
    stake.spent = stake.native_amount == 0 || stake.dash_amount == 0;

    stake.native_signature_valid = !stake.native_address.is_empty()
        && verify_utxo_signature(
            &stake.native_address,
            &stake.native_utxo,
            &stake.native_signature,
            params.native_address_version,
        );
    stake.dash_signature_valid = !stake.dash_address.is_empty()
        && verify_utxo_signature(
            &stake.dash_address,
            &stake.dash_utxo,
            &stake.dash_signature,
            params.dash_address_version,
        );

    if stake.claimed_rate > params.max_dash_rate || stake.claimed_rate.is_negative() {
        stake.claimed_rate = Fixed::ZERO;
    }
    stake.actual_rate = scaled_yield(stake.duration_days, stake.claimed_rate, params.max_dash_rate);
    stake.quantity = deliverable_quantity(&stake);
    let monthly = (stake.quantity * stake.actual_rate)
        .div_int(12)
        .unwrap_or(Fixed::ZERO);
    stake.monthly_earnings = tag_payout(monthly, DASH_PAYOUT_TAG);
    stake.maturity_height = stake.burn_height + stake.duration_days * params.blocks_per_day;
    stake.maturity_time = stake.burn_time + stake.duration_days * SECONDS_PER_DAY;

    stake.found = stake.issues.is_empty() && stake.burn_height > 0 && stake.duration_days > 0;
    stake
}

/// Parameters of a dash stake to be broadcast
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashStakeRequest {
    pub return_address: String,
    pub owner_key: String,
    pub duration_days: i64,
    pub height: Height,
    pub time: Timestamp,
    pub rate: Fixed,
    pub native_utxo: String,
    pub dash_utxo: String,
    pub native_signature: String,
    pub dash_signature: String,
    pub native_price: Fixed,
    pub dash_price: Fixed,
    pub btc_price: Fixed,
    pub native_value_usd: Fixed,
    pub dash_value_usd: Fixed,
    pub native_amount: Amount,
    pub dash_amount: Amount,
}

impl DashStakeRequest {
    /// Sign both UTXO ids with their owners' keys
    pub fn sign(mut self, native: &KeyPair, dash: &KeyPair) -> covenant_crypto::Result<Self> {
        self.native_signature = sign_utxo(native, &self.native_utxo)?;
        self.dash_signature = sign_utxo(dash, &self.dash_utxo)?;
        Ok(self)
    }

    pub fn expiration(&self) -> Timestamp {
        self.time + self.duration_days * SECONDS_PER_DAY
    }

    /// `<dashstake>..</dashstake>` payload
    pub fn payload(&self) -> String {
        let amount = |a: Amount| Fixed::from_amount(a).to_string_dp(8);
        PayloadBuilder::new()
            .field("time", self.time)
            .field("height", self.height)
            .field("duration", self.duration_days)
            .field("cpk", &self.owner_key)
            .field("dwu", self.rate.to_string_dp(4))
            .field("returnaddress", &self.return_address)
            .field("nativeutxo", &self.native_utxo)
            .field("dashutxo", &self.dash_utxo)
            .field("nativesig", &self.native_signature)
            .field("dashsig", &self.dash_signature)
            .field("nativeprice", self.native_price.to_string_dp(12))
            .field("dashprice", self.dash_price.to_string_dp(12))
            .field("btcprice", self.btc_price.to_string_dp(12))
            .field("nativevalue", self.native_value_usd.to_string_dp(2))
            .field("dashvalue", self.dash_value_usd.to_string_dp(2))
            .field("nativeamount", amount(self.native_amount))
            .field("dashamount", amount(self.dash_amount))
            .wrap("dashstake")
    }

    pub fn message(&self) -> String {
        let key = format!(
            "{}-{}-{}-{}",
            DASH_MESSAGE_KIND,
            self.native_utxo,
            self.dash_utxo,
            self.expiration()
        );
        TxMessage::encode(DASH_MESSAGE_KIND, &key, &self.payload())
    }

    /// One coin to the burn address carrying the payload
    pub fn burn_output(&self, params: &ConsensusParams) -> TxOut {
        TxOut::new(params.burn_address.clone(), COIN).with_message(self.message())
    }

    pub fn transaction(&self, params: &ConsensusParams, inputs: Vec<TxIn>) -> Transaction {
        Transaction::new(inputs, vec![self.burn_output(params)])
    }
}
