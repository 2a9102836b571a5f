//! Typed wrappers around single JSON-RPC calls.
//!
//! Every function performs one attempt against one node and decodes the
//! `result` payload. Errors from the transport pass through unchanged.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{
    config::CallConfig,
    outcome::Outcome,
    transport::call,
    types::{AccountInfo, ClusterNode, EpochInfo, LeaderSchedule, TokenAmount, VoteAccount},
};

fn from_json<T: DeserializeOwned>(value: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(value)
}

/// Reads `result.value` from a context-wrapped response.
fn context_value(result: Value) -> Result<Value, String> {
    match result {
        Value::Object(mut obj) => obj
            .remove("value")
            .ok_or_else(|| "missing field `value`".to_string()),
        other => Err(format!("expected object, got {other}")),
    }
}

/// Balance of `address` in lamports.
pub async fn get_balance(node: &str, address: &str, cfg: &CallConfig) -> Outcome<u64> {
    call(node, "getBalance", json!([address]), cfg)
        .await
        .decode(|result| {
            context_value(result)?
                .as_u64()
                .ok_or_else(|| "`value` is not an unsigned integer".to_string())
        })
}

/// Epoch, slot and block height the node is at.
pub async fn get_epoch_info(node: &str, cfg: &CallConfig) -> Outcome<EpochInfo> {
    call(node, "getEpochInfo", json!([]), cfg)
        .await
        .decode(from_json)
}

/// Gossip view of the cluster, one entry per node.
pub async fn get_cluster_nodes(node: &str, cfg: &CallConfig) -> Outcome<Vec<ClusterNode>> {
    call(node, "getClusterNodes", json!([]), cfg)
        .await
        .decode(from_json)
}

/// Current and delinquent vote accounts, in that order.
pub async fn get_vote_accounts(node: &str, cfg: &CallConfig) -> Outcome<Vec<VoteAccount>> {
    call(node, "getVoteAccounts", json!([]), cfg)
        .await
        .decode(decode_vote_accounts)
}

pub(crate) fn decode_vote_accounts(result: Value) -> Result<Vec<VoteAccount>, String> {
    let mut accounts = Vec::new();
    for (key, delinquent) in [("current", false), ("delinquent", true)] {
        let list = result
            .get(key)
            .cloned()
            .ok_or_else(|| format!("missing field `{key}`"))?;
        let list: Vec<VoteAccount> = from_json(list).map_err(|e| e.to_string())?;
        accounts.extend(list.into_iter().map(|mut acc| {
            acc.delinquent = delinquent;
            acc
        }));
    }
    Ok(accounts)
}

/// Leader schedule of the current epoch, `None` when the node has none.
pub async fn get_leader_schedule(
    node: &str,
    cfg: &CallConfig,
) -> Outcome<Option<LeaderSchedule>> {
    call(node, "getLeaderSchedule", json!([]), cfg)
        .await
        .decode(from_json)
}

/// What a `getAccountInfo` response says about an address.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountLookup {
    /// The node answered at a known slot that there is no account.
    Missing,
    Found(AccountInfo),
    /// The response has no `context.slot`, so a null `value` proves nothing.
    Unconfirmed,
}

/// Looks up `address` without judging responses that lack `context.slot`.
pub async fn lookup_account(node: &str, address: &str, cfg: &CallConfig) -> Outcome<AccountLookup> {
    call(
        node,
        "getAccountInfo",
        json!([address, {"encoding": "base64"}]),
        cfg,
    )
    .await
    .decode(decode_account_lookup)
}

/// Account info of `address`; `None` when the account does not exist.
///
/// The response must carry `context.slot`, otherwise it is treated as
/// malformed.
pub async fn get_account_info(
    node: &str,
    address: &str,
    cfg: &CallConfig,
) -> Outcome<Option<AccountInfo>> {
    lookup_account(node, address, cfg)
        .await
        .decode(|lookup| match lookup {
            AccountLookup::Missing => Ok(None),
            AccountLookup::Found(info) => Ok(Some(info)),
            AccountLookup::Unconfirmed => Err("missing field `context.slot`"),
        })
}

pub(crate) fn decode_account_lookup(result: Value) -> Result<AccountLookup, String> {
    let has_slot = result
        .pointer("/context/slot")
        .and_then(Value::as_u64)
        .is_some();
    if !has_slot {
        return Ok(AccountLookup::Unconfirmed);
    }
    match context_value(result)? {
        Value::Null => Ok(AccountLookup::Missing),
        value => from_json(value)
            .map(AccountLookup::Found)
            .map_err(|e| e.to_string()),
    }
}

/// Token account addresses owned by `owner` for `mint`.
pub async fn get_token_accounts_by_owner(
    node: &str,
    owner: &str,
    mint: &str,
    cfg: &CallConfig,
) -> Outcome<Vec<String>> {
    call(
        node,
        "getTokenAccountsByOwner",
        json!([owner, {"mint": mint}, {"encoding": "jsonParsed"}]),
        cfg,
    )
    .await
    .decode(|result| {
        let value = context_value(result)?;
        let accounts = value.as_array().ok_or("`value` is not an array")?;
        accounts
            .iter()
            .map(|acc| {
                acc.get("pubkey")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| "token account without `pubkey`".to_string())
            })
            .collect::<Result<Vec<_>, String>>()
    })
}

/// Balance held by one token account.
pub async fn get_token_account_balance(
    node: &str,
    token_account: &str,
    cfg: &CallConfig,
) -> Outcome<TokenAmount> {
    call(node, "getTokenAccountBalance", json!([token_account]), cfg)
        .await
        .decode(|result| from_json(context_value(result)?).map_err(|e| e.to_string()))
}
