//! SPL token balance lookup and transfers.

use std::str::FromStr;

use log::debug;
use serde_json::json;
use solana_keypair::Keypair;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};
use solana_signer::Signer;

use crate::{
    client::sign_and_send,
    config::CallConfig,
    errors::CallError,
    outcome::Outcome,
    rpc::{get_token_account_balance, get_token_accounts_by_owner},
    types::TokenAmount,
};

pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Address of `wallet`'s associated token account for `mint`.
pub fn associated_token_address(wallet: &Pubkey, mint: &Pubkey) -> Pubkey {
    let seeds: [&[u8]; 3] = [wallet.as_ref(), spl_token_interface::ID.as_ref(), mint.as_ref()];
    Pubkey::find_program_address(&seeds, &ASSOCIATED_TOKEN_PROGRAM_ID).0
}

/// Creates `wallet`'s associated token account for `mint`, paid by `payer`.
///
/// Uses the idempotent variant, so it succeeds if the account already exists.
pub fn create_associated_token_account(payer: &Pubkey, wallet: &Pubkey, mint: &Pubkey) -> Instruction {
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(associated_token_address(wallet, mint), false),
            AccountMeta::new_readonly(*wallet, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(solana_system_interface::program::ID, false),
            AccountMeta::new_readonly(spl_token_interface::ID, false),
        ],
        data: vec![1],
    }
}

/// Token balance of `owner` for `mint`.
///
/// With an explicit `token_account` only that account is read. Otherwise all
/// of the owner's token accounts for the mint are read and exactly one of
/// them may hold a non-zero balance.
pub async fn get_balance(
    node: &str,
    owner: &str,
    mint: &str,
    token_account: Option<&str>,
    cfg: &CallConfig,
) -> Outcome<TokenAmount> {
    if let Some(account) = token_account {
        return get_token_account_balance(node, account, cfg).await;
    }

    let accounts = get_token_accounts_by_owner(node, owner, mint, cfg).await;
    let raw = accounts.raw.clone();
    let accounts = match accounts.into_result() {
        Ok(accounts) if accounts.is_empty() => return Outcome::err(CallError::NoTokenAccounts, raw),
        Ok(accounts) => accounts,
        Err(e) => return Outcome::err(e, raw),
    };
    debug!("{owner} holds {} token account(s) for {mint}", accounts.len());

    let mut first = None;
    let mut non_empty = Vec::new();
    for account in &accounts {
        let balance = get_token_account_balance(node, account, cfg).await;
        let raw = balance.raw.clone();
        let amount = match balance.into_result() {
            Ok(amount) => amount,
            Err(e) => return Outcome::err(e, raw),
        };
        if amount.amount > 0 {
            non_empty.push((amount, raw));
        } else if first.is_none() {
            first = Some((amount, raw));
        }
    }

    match non_empty.len() {
        0 => match first {
            Some((amount, raw)) => Outcome::ok(amount, raw),
            None => Outcome::err(CallError::NoTokenAccounts, raw),
        },
        1 => {
            let (amount, raw) = non_empty.remove(0);
            Outcome::ok(amount, raw)
        }
        _ => Outcome::err(CallError::ManyTokenAccounts, raw),
    }
}

/// Sends `amount` base units of `mint` from the payer's token account to
/// `recipient`'s, in one attempt against `node`.
///
/// The payer must hold exactly one token account for the mint. The
/// recipient's account is used when there is exactly one; with none, its
/// associated token account is created in the same transaction.
pub async fn transfer(
    node: &str,
    payer: &Keypair,
    recipient: &Pubkey,
    mint: &Pubkey,
    amount: u64,
    cfg: &CallConfig,
) -> Outcome<String> {
    let owner = payer.pubkey();
    let mint_str = mint.to_string();

    let sources = get_token_accounts_by_owner(node, &owner.to_string(), &mint_str, cfg).await;
    let raw = sources.raw.clone();
    let source = match sources.into_result() {
        Ok(accounts) => match accounts.as_slice() {
            [] => return Outcome::err(CallError::NoTokenAccounts, raw),
            [account] => account.clone(),
            _ => return Outcome::err(CallError::ManyFromTokenAccounts, raw),
        },
        Err(e) => return Outcome::err(e, raw),
    };
    let source = match account_key(&source) {
        Ok(key) => key,
        Err(e) => return Outcome::err(e, raw),
    };

    let mut instructions = Vec::with_capacity(2);
    let targets = get_token_accounts_by_owner(node, &recipient.to_string(), &mint_str, cfg).await;
    let raw = targets.raw.clone();
    let destination = match targets.into_result() {
        Ok(accounts) => match accounts.as_slice() {
            [] => {
                debug!("{recipient} has no token account for {mint}, creating one");
                instructions.push(create_associated_token_account(&owner, recipient, mint));
                associated_token_address(recipient, mint)
            }
            [account] => match account_key(account) {
                Ok(key) => key,
                Err(e) => return Outcome::err(e, raw),
            },
            _ => return Outcome::err(CallError::ManyToTokenAccounts, raw),
        },
        Err(e) => return Outcome::err(e, raw),
    };

    let ix = spl_token_interface::instruction::transfer(
        &spl_token_interface::ID,
        &source,
        &destination,
        &owner,
        &[],
        amount,
    );
    match ix {
        Ok(ix) => instructions.push(ix),
        Err(e) => return Outcome::err(CallError::decode(e), raw),
    }

    let raw = json!({
        "node": node,
        "source": source.to_string(),
        "destination": destination.to_string(),
        "amount": amount,
    });
    sign_and_send(node, payer, &instructions, cfg, raw).await
}

fn account_key(address: &str) -> Result<Pubkey, CallError> {
    Pubkey::from_str(address)
        .map_err(|e| CallError::Decode(format!("bad token account {address}: {e}")))
}
