//! Key Ledger Engine CLI
//!
//! # Usage
//!
//! ```bash
//! key-ledger-engine --config keyledger.toml serve
//! key-ledger-engine serve --host 0.0.0.0 --port 9000
//! key-ledger-engine export-usage --owner prov-1 > usage.csv
//! key-ledger-engine export-usage --owner prov-1 --out usage.csv
//! ```
//!
//! `serve` loads the configuration, wires the store, ledger, state machine,
//! reconciler, and unlock gate together, and runs the HTTP service.
//! `export-usage` pulls a provider's key-usage audit trail from a running
//! service and writes it as CSV.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (invalid configuration, bind failure, unreachable service, etc.)

use std::net::SocketAddr;
use std::process;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use key_ledger_engine::cli::{self, CliArgs, Command};
use key_ledger_engine::config::Config;
use key_ledger_engine::core::{KeyLedger, MemoryStore, RequestMachine, UnlockGate};
use key_ledger_engine::gateway::HttpGateway;
use key_ledger_engine::http::{self, AppState};
use key_ledger_engine::io::write_usage_csv;
use key_ledger_engine::reconcile::Reconciler;
use key_ledger_engine::types::{KeyUsageRecord, LedgerError};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = cli::parse_args();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: CliArgs) -> Result<(), LedgerError> {
    match args.command {
        Command::Serve { host, port } => {
            let config = Config::load(&args.config)?;

            let store = Arc::new(MemoryStore::new());
            let ledger = KeyLedger::new(store.clone());
            let machine = RequestMachine::new(store.clone(), ledger.clone());
            let gateway = Arc::new(HttpGateway::new(
                &config.gateway.base_url,
                &config.gateway.secret_key,
                Some(config.gateway.timeout()),
            )?);
            let reconciler = Arc::new(Reconciler::new(
                gateway.clone(),
                ledger.clone(),
                config.plan_table()?,
                config.gateway.retry_policy(),
                config.gateway.page_size,
            ));
            let unlock = Arc::new(UnlockGate::new(store, gateway, config.unlock.price_minor));

            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .map_err(|e| LedgerError::config(format!("invalid bind address: {e}")))?;

            http::serve(
                addr,
                AppState {
                    machine,
                    ledger,
                    reconciler,
                    unlock,
                },
            )
            .await
        }

        Command::ExportUsage {
            owner,
            service_url,
            out,
        } => {
            let url = format!("{}/usage?owner={}", service_url.trim_end_matches('/'), owner);
            let records: Vec<KeyUsageRecord> = reqwest::get(&url)
                .await
                .map_err(|e| LedgerError::store(format!("cannot reach service: {e}")))?
                .error_for_status()
                .map_err(|e| LedgerError::store(format!("usage query failed: {e}")))?
                .json()
                .await
                .map_err(|e| LedgerError::store(format!("invalid usage response: {e}")))?;

            match out {
                Some(path) => {
                    let mut file = std::fs::File::create(&path).map_err(|e| {
                        LedgerError::store(format!("cannot create {}: {e}", path.display()))
                    })?;
                    write_usage_csv(&records, &mut file).map_err(LedgerError::store)?;
                }
                None => {
                    let mut stdout = std::io::stdout();
                    write_usage_csv(&records, &mut stdout).map_err(LedgerError::store)?;
                }
            }

            Ok(())
        }
    }
}
