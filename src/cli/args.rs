use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Prepaid key ledger and request-acceptance service
#[derive(Parser, Debug)]
#[command(name = "key-ledger-engine")]
#[command(about = "Prepaid key ledger and request-acceptance service", long_about = None)]
pub struct CliArgs {
    /// Path to the TOML configuration file
    #[arg(
        long = "config",
        value_name = "FILE",
        default_value = "keyledger.toml",
        help = "Path to the TOML configuration file"
    )]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service
    Serve {
        /// Bind host, overriding the configuration
        #[arg(long, value_name = "HOST")]
        host: Option<String>,

        /// Bind port, overriding the configuration
        #[arg(long, value_name = "PORT")]
        port: Option<u16>,
    },

    /// Export a provider's key-usage audit trail as CSV
    ExportUsage {
        /// Provider id to export usage for
        #[arg(long, value_name = "OWNER")]
        owner: String,

        /// Base URL of a running key-ledger service
        #[arg(
            long = "service-url",
            value_name = "URL",
            default_value = "http://127.0.0.1:8807"
        )]
        service_url: String,

        /// Output file (stdout when omitted)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
    },
}
