//! Typed records decoded from node responses.
//!
//! Each record is a flat projection of the fields this crate cares about.
//! Wire names are camelCase; missing required fields fail the whole decode.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `getEpochInfo` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct EpochInfo {
    pub absolute_slot: u64,
    pub block_height: u64,
    pub epoch: u64,
    pub slot_index: u64,
    pub slots_in_epoch: u64,
    pub transaction_count: u64,
}

/// One entry of `getClusterNodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct ClusterNode {
    pub pubkey: String,
    pub gossip: Option<String>,
    pub tpu: Option<String>,
    pub rpc: Option<String>,
    pub version: Option<String>,
    pub feature_set: Option<u32>,
    pub shred_version: Option<u16>,
}

/// Credits earned by a vote account in one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(u64, u64, u64)")]
pub struct EpochCredits {
    pub epoch: u64,
    pub credits: u64,
    pub previous_credits: u64,
}

impl From<(u64, u64, u64)> for EpochCredits {
    fn from((epoch, credits, previous_credits): (u64, u64, u64)) -> Self {
        Self {
            epoch,
            credits,
            previous_credits,
        }
    }
}

/// One vote account from `getVoteAccounts`, current or delinquent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct VoteAccount {
    pub vote_pubkey: String,
    pub node_pubkey: String,
    /// Stake delegated to this account, in lamports.
    pub activated_stake: u64,
    pub commission: u8,
    pub epoch_vote_account: bool,
    pub last_vote: u64,
    pub root_slot: u64,
    pub epoch_credits: Vec<EpochCredits>,
    #[serde(default)]
    pub delinquent: bool,
}

/// Leader identity → slot indexes relative to the first slot of the epoch.
pub type LeaderSchedule = BTreeMap<String, Vec<u64>>;

/// `getTokenAccountBalance` value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct TokenAmount {
    /// Raw amount in base units.
    #[serde(with = "amount_string")]
    pub amount: u64,
    pub decimals: u8,
    pub ui_amount_string: Decimal,
}

/// Account summary from `getAccountInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct AccountInfo {
    pub lamports: u64,
    pub owner: String,
    pub executable: bool,
    #[serde(default)]
    pub space: Option<u64>,
}

/// Transaction counts of one block, split by vote/non-vote and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTxCount {
    pub slot: u64,
    pub block_time: Option<i64>,
    pub vote_tx_ok: u64,
    pub vote_tx_error: u64,
    pub non_vote_tx_ok: u64,
    pub non_vote_tx_error: u64,
}

impl BlockTxCount {
    pub fn total(&self) -> u64 {
        self.vote_tx_ok + self.vote_tx_error + self.non_vote_tx_ok + self.non_vote_tx_error
    }
}

/// A native SOL transfer found in a parsed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferInfo {
    pub source: String,
    pub destination: String,
    pub lamports: u64,
}

mod amount_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        String::deserialize(d)?
            .parse()
            .map_err(serde::de::Error::custom)
    }
}
