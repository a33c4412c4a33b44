use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

/// Register with and query AVS contracts described by a specification document
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory holding one sub-directory per AVS
    #[arg(long, env = "AVS_REPOSITORY", default_value = "./avs-specs")]
    pub repository: PathBuf,

    /// Name of the AVS, i.e. its directory in the repository
    #[arg(long, env = "AVS_NAME")]
    pub avs: String,

    /// Operator configuration file (JSON)
    #[arg(long, env = "AVS_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Ethereum RPC endpoint. Falls back to `eth_rpc_url` in the configuration file.
    #[arg(long, env = "AVS_ETH_RPC_URL")]
    pub rpc_url: Option<Url>,

    #[command(flatten)]
    pub wallet: WalletArgs,

    /// Build and sign transactions without broadcasting them
    #[arg(long, env = "AVS_DRY_RUN", default_value = "false")]
    pub dry_run: bool,

    /// How long to wait for a transaction receipt
    #[arg(long, env = "AVS_RECEIPT_TIMEOUT_SECS", default_value = "120")]
    pub receipt_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Commands,
}

/// Key used to sign write transactions. Read-only commands need neither.
#[derive(Debug, Clone, Args)]
#[group(multiple = false)]
pub struct WalletArgs {
    /// Hex encoded ECDSA private key
    #[arg(long, env = "AVS_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Encrypted JSON keystore; its password is read from AVS_KEYSTORE_PASSWORD or prompted
    #[arg(long, env = "AVS_KEYSTORE")]
    pub keystore: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Commands {
    /// Register the operator with the AVS
    Register,
    /// Opt the operator in
    OptIn,
    /// Opt the operator out
    OptOut,
    /// Deregister the operator
    Deregister,
    /// Print the operator's registration status
    Status,
    /// Submit any operation the specification declares
    Execute {
        operation: String,
    },
    /// Read any operation the specification declares, optionally with explicit argument expressions
    Call {
        operation: String,
        #[arg(trailing_var_arg = true)]
        arguments: Vec<String>,
    },
}
