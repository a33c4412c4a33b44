use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use avs_executor::chain::AlloyChainClient;
use avs_executor::cli::{Cli, Commands, WalletArgs};
use avs_executor::config::FileConfiguration;
use avs_executor::controller::{Collaborators, ExecutionController, Outcome};
use avs_executor::error::user_facing_message;
use avs_executor::logging::init_logging;
use avs_executor::signer::LocalKeystoreSigner;
use avs_executor::spec::repository::FileRepository;
use avs_executor::spec::Specification;
use avs_executor::transaction::{AlloyTransactionManager, TransactionOutcome};
use avs_executor::value::Value;
use clap::Parser as _;
use serde::Deserialize;
use tracing::{error, info};
use url::Url;

/// Node settings read from the operator configuration when not given on the command line.
#[derive(Debug, Default, Deserialize)]
struct NodeSettings {
    #[serde(default)]
    eth_rpc_url: Option<Url>,
}

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialise logging: {e}");
    }
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let message = format!("{e:#}");
            error!(error = %message, error_chain = ?e, "Command failed");
            eprintln!("Error: {}", user_facing_message(&message));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let configuration =
        FileConfiguration::load(cli.config.as_deref()).context("Failed to load operator configuration")?;
    let rpc_url = match cli.rpc_url.clone() {
        Some(url) => url,
        None => configuration
            .unmarshal::<NodeSettings>()?
            .eth_rpc_url
            .context("No RPC endpoint: pass --rpc-url or set eth_rpc_url in the configuration")?,
    };

    let wallet = load_wallet(&cli.wallet)?.map(EthereumWallet::from);
    let provider = ProviderBuilder::new().connect_http(rpc_url).erased();

    let repository = Arc::new(FileRepository::new(&cli.repository));
    let spec = Specification::load(repository.as_ref(), &cli.avs)?;
    info!(avs = %spec.name, network = %spec.network, "Specification loaded");

    let collaborators = Collaborators {
        repository,
        configuration: Arc::new(configuration),
        chain: Arc::new(AlloyChainClient::new(provider.clone())),
        transactions: Arc::new(AlloyTransactionManager::new(
            provider,
            wallet,
            cli.dry_run,
            Duration::from_secs(cli.receipt_timeout_secs),
        )),
        signer: Arc::new(LocalKeystoreSigner),
    };
    let mut controller = ExecutionController::new(spec, collaborators);

    match cli.command {
        Commands::Register => report_transaction(controller.register().await?),
        Commands::OptIn => report_transaction(controller.opt_in().await?),
        Commands::OptOut => report_transaction(controller.opt_out().await?),
        Commands::Deregister => report_transaction(controller.deregister().await?),
        Commands::Execute { operation } => report_transaction(controller.execute(&operation).await?),
        Commands::Status => report_status(controller.status().await?),
        Commands::Call { operation, arguments } => {
            let explicit = (!arguments.is_empty()).then_some(arguments);
            report_value(controller.call(&operation, explicit).await?)
        }
    }
    Ok(())
}

fn load_wallet(args: &WalletArgs) -> Result<Option<PrivateKeySigner>> {
    if let Some(key) = &args.private_key {
        return Ok(Some(key.parse::<PrivateKeySigner>().context("Invalid private key")?));
    }
    let Some(path) = &args.keystore else {
        return Ok(None);
    };
    let password = match std::env::var("AVS_KEYSTORE_PASSWORD") {
        Ok(password) => password,
        Err(_) => dialoguer::Password::new().with_prompt("Keystore password").interact()?,
    };
    let signer = PrivateKeySigner::decrypt_keystore(path, password)
        .with_context(|| format!("Failed to decrypt keystore {}", path.display()))?;
    Ok(Some(signer))
}

#[allow(clippy::print_stdout)]
fn report_transaction(outcome: Outcome<TransactionOutcome>) {
    match outcome {
        Outcome::Unsupported(message) => println!("{message}"),
        Outcome::Completed(tx) if tx.is_dry_run() => println!("Dry run, signed transaction {}", tx.tx_hash),
        Outcome::Completed(tx) => println!("Transaction {} succeeded", tx.tx_hash),
    }
}

#[allow(clippy::print_stdout)]
fn report_value(outcome: Outcome<Value>) {
    match outcome {
        Outcome::Unsupported(message) => println!("{message}"),
        Outcome::Completed(value) => println!("{value}"),
    }
}

#[allow(clippy::print_stdout)]
fn report_status(outcome: Outcome<i64>) {
    match outcome {
        Outcome::Unsupported(message) => println!("{message}"),
        Outcome::Completed(status) => println!("{status}"),
    }
}
