//! Command-line tools for Solana accounts and nodes.
//!
//! Config-driven subcommands read a YAML (or `.toml`) file whose string
//! values may reference environment variables as `{{ NAME }}`. Results are
//! printed to stdout as JSON; logs go to stderr (`RUST_LOG`, default `warn`).

mod app;
mod commands;
mod env;

use std::path::PathBuf;

use app::Context;
use clap::{Parser, Subcommand};
use color_eyre::Result;
use commands::ExampleModule;

#[derive(Parser)]
#[command(name = "solana-node-kit")]
#[command(about = "Balances, transfers and keypair tools for Solana")]
#[command(version)]
struct Cli {
    /// Print the resolved config as JSON and exit.
    #[arg(short, long, global = true)]
    config: bool,

    /// JSON-RPC node; replaces `nodes` from the config file. Repeatable.
    #[arg(short = 'n', long = "node", global = true)]
    nodes: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print SOL and token balances.
    Balance {
        /// Config file with `accounts`, `nodes` and optional `tokens`.
        config_path: PathBuf,
    },

    /// Transfer SOL to a list of recipients.
    TransferSol {
        /// Config file with `from_address`, `private_key`, `recipients`, `nodes`, `amount`.
        config_path: PathBuf,
    },

    /// Generate new accounts.
    GenerateAccounts {
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Print private keys in the array format.
        #[arg(long)]
        array: bool,
    },

    /// Print public, private_base58 and private_arr for a private key.
    Keypair {
        /// Base58 key, `[n,n,...]` array, or path to a keypair file.
        private_key: String,
    },

    /// Print the keypair of the first account derived from a BIP39 mnemonic.
    KeypairFromMnemonic {
        /// Mnemonic words; read from stdin when omitted.
        mnemonic: Option<String>,

        /// Optional BIP39 passphrase.
        #[arg(long, default_value = "")]
        passphrase: String,
    },

    /// Print an example config and exit.
    Example {
        #[arg(value_enum)]
        module: ExampleModule,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let ctx = Context {
        print_config: cli.config,
        nodes: cli.nodes,
    };

    match cli.command {
        Commands::Balance { config_path } => commands::balance(&ctx, &config_path).await?,
        Commands::TransferSol { config_path } => commands::transfer_sol(&ctx, &config_path).await?,
        Commands::GenerateAccounts { limit, array } => commands::generate_accounts(limit, array),
        Commands::Keypair { private_key } => commands::keypair(&private_key)?,
        Commands::KeypairFromMnemonic {
            mnemonic,
            passphrase,
        } => commands::keypair_from_mnemonic(mnemonic, &passphrase)?,
        Commands::Example { module } => commands::example(module),
    }

    Ok(())
}
