//! CLI smoke entry point.
//!
//! # Responsibility
//! - Start file logging when `--log-dir` is given.
//! - Run one register/query round trip on an in-memory ledger.
//! - Keep output deterministic for quick local sanity checks.

use clap::Parser;
use datablock_core::{
    credential, default_log_level, init_logging, AllowAll, ContractCall,
    CredentialIdentityProvider, DataBlockContract, DataBlockInput, DataBlockManager,
    LedgerConfig, MemoryLedger, Proposal, TRANSIENT_PRIVATE,
};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "datablock", version, about = "Data block ledger smoke check")]
struct Cli {
    /// Directory for rolling log files; logging stays off when omitted.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log level spec, e.g. `info` or `debug`.
    #[arg(long, default_value = default_log_level())]
    log_level: String,

    /// JSON ledger config; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Organization hosting this node and submitting the smoke requests.
    #[arg(long, default_value = "Org1MSP")]
    org: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    if let Some(log_dir) = &cli.log_dir {
        init_logging(&cli.log_level, log_dir)?;
    }

    println!("datablock_core ping={}", datablock_core::ping());
    println!("datablock_core version={}", datablock_core::core_version());

    let config = match &cli.config {
        Some(path) => LedgerConfig::from_path(path)?,
        None => LedgerConfig::default(),
    };
    let manager = DataBlockManager::new(
        config,
        CredentialIdentityProvider::new(cli.org.as_str())?,
        AllowAll,
    )?;
    let contract = DataBlockContract::new(manager);
    let mut ledger = MemoryLedger::new();
    let creator = credential(&cli.org, "smoke")?;

    let register = Proposal::new()
        .with_tx_id("smoke-register")
        .with_timestamp_ms(0)
        .with_creator(creator.clone())
        .with_transient(TRANSIENT_PRIVATE, r#"{"smoke":{"content":"ok"}}"#);
    contract
        .submit(
            &mut ledger,
            &register,
            ContractCall::Register {
                blocks: vec![DataBlockInput::new("smoke", "smoke check")],
            },
        )
        .map_err(|payload| payload.to_string())?;

    let query = Proposal::new()
        .with_tx_id("smoke-query")
        .with_creator(creator);
    let response = contract
        .evaluate(
            &ledger,
            &query,
            ContractCall::Query {
                ids: vec!["smoke".to_string()],
            },
        )
        .map_err(|payload| payload.to_string())?;

    println!("datablock_core smoke={}", String::from_utf8_lossy(&response));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn log_dir_is_optional_and_level_has_default() {
        let cli = Cli::try_parse_from(["datablock"]).unwrap();
        assert_eq!(cli.log_dir, None);
        assert_eq!(cli.log_level, datablock_core::default_log_level());
        assert_eq!(cli.org, "Org1MSP");

        let cli = Cli::try_parse_from([
            "datablock",
            "--log-dir",
            "/tmp/datablock-logs",
            "--log-level",
            "warn",
        ])
        .unwrap();
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/datablock-logs")));
        assert_eq!(cli.log_level, "warn");
    }
}
