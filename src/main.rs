use std::path::PathBuf;

use clap::{Parser, Subcommand};

use share_asset_contract::config::Settings;
use share_asset_contract::contracts::registry::ContractMetadata;
use share_asset_contract::ledger::FileState;
use share_asset_contract::logging;
use share_asset_contract::tx::{Executor, TxOutcome, TxReceipt};

/// Share asset contract driven against a local world state file
#[derive(Parser, Debug)]
#[command(name = "share-asset")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML config file (defaults to $SHARE_ASSET_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// World state file, overrides the config
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Creator identity mixed into transaction ids, overrides the config
    #[arg(long, global = true)]
    creator: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print whether a share asset exists
    Exists { id: String },
    /// Create a share asset
    Create { id: String, value: String },
    /// Print a share asset as JSON
    Read { id: String },
    /// Replace the value of a share asset
    Update { id: String, value: String },
    /// Delete a share asset
    Delete { id: String },
    /// Run any registered function by name and print the receipt
    Invoke {
        function: String,
        args: Vec<String>,
    },
    /// Print the contract metadata
    Metadata,
    /// Print the Merkle root of the world state
    StateRoot,
}

fn fail(code: i32, msg: impl std::fmt::Display) -> ! {
    eprintln!("error: {msg}");
    std::process::exit(code)
}

fn print_payload(receipt: &TxReceipt) {
    match &receipt.outcome {
        TxOutcome::Rejected { reason } => fail(1, reason),
        TxOutcome::Committed { writes, .. } => {
            for write in writes {
                tracing::info!(key = write.key(), "state updated");
            }
        }
        TxOutcome::Evaluated { payload } => {
            println!("{}", String::from_utf8_lossy(payload));
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref()).unwrap_or_else(|err| fail(2, err));
    if let Some(state) = cli.state {
        settings.state_path = state;
    }
    if let Some(creator) = cli.creator {
        settings.creator = creator;
    }
    logging::init(&settings.log);

    let state = FileState::open(&settings.state_path)
        .await
        .unwrap_or_else(|err| fail(2, err));
    let executor = Executor::new(state, settings.creator);

    let (function, args) = match cli.command {
        Command::Exists { id } => ("shareAssetExists", vec![id]),
        Command::Create { id, value } => ("createShareAsset", vec![id, value]),
        Command::Read { id } => ("readShareAsset", vec![id]),
        Command::Update { id, value } => ("updateShareAsset", vec![id, value]),
        Command::Delete { id } => ("deleteShareAsset", vec![id]),
        Command::Invoke { function, args } => {
            let receipt = executor.execute(&function, &args).await;
            match serde_json::to_string_pretty(&receipt) {
                Ok(json) => println!("{json}"),
                Err(err) => fail(1, err),
            }
            if receipt.is_rejected() {
                std::process::exit(1);
            }
            return;
        }
        Command::StateRoot => {
            println!("{}", hex::encode(executor.state().state_root().await));
            return;
        }
        Command::Metadata => {
            match serde_json::to_string_pretty(&ContractMetadata::describe()) {
                Ok(json) => println!("{json}"),
                Err(err) => fail(1, err),
            }
            return;
        }
    };

    let receipt = executor.execute(function, &args).await;
    print_payload(&receipt);
}
