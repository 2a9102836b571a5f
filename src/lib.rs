//! Thin client utilities for Solana nodes.
//!
//! The crate talks to nodes over JSON-RPC and drives the `solana` command-line
//! tool. Every remote operation returns an [`Outcome`]: the decoded value or a
//! [`CallError`], together with the raw data that was received so a failure
//! can always be diagnosed.
//!
//! # Quick Start
//!
//! ```no_run
//! use solana_node_kit::{CallConfig, NodeClient, NodePool};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let nodes = NodePool::single("https://api.mainnet-beta.solana.com")?;
//! let client = NodeClient::new(nodes, CallConfig::default().with_attempts(5));
//!
//! let epoch = client.get_epoch_info().await;
//! match epoch.into_result() {
//!     Ok(info) => println!("epoch {} slot {}", info.epoch, info.absolute_slot),
//!     Err(e) => eprintln!("{e}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Layers
//!
//! - [`transport`] sends one JSON-RPC request and classifies the answer.
//! - [`rpc`], [`block`] and [`token`] decode specific methods against one node.
//! - [`client`] retries those against a [`NodePool`].
//! - [`shell`] and [`solana_cli`] run the `solana` binary locally or over ssh.
//! - [`keypair`] converts between private key encodings.

pub mod block;
pub mod client;
pub mod config;
pub mod errors;
pub mod keypair;
pub mod outcome;
pub mod rpc;
pub mod shell;
pub mod solana_cli;
pub mod token;
pub mod transport;
pub mod types;
pub mod units;

pub use block::VoteSignature;
pub use client::{with_retry, NodeClient, SolTransfer, TokenTransfer};
pub use config::{CallConfig, NodePool};
pub use errors::{CallError, Error};
pub use outcome::Outcome;
pub use shell::{CommandExecutor, CommandOutput, LocalShell, SshShell};
pub use solana_cli::{SolanaCli, WithdrawAmount};
pub use units::{lamports_to_sol, sol_to_lamports, LAMPORTS_PER_SOL};
