//! Simple Ledger operator binary
//!
//! ```text
//! simple_ledger [--env <env>] [transfer <from> <to> <amount>]
//! ```
//!
//! Loads `config/<env>.yaml`, connects to PostgreSQL, applies the ledger
//! schema and checks the connection. With `transfer`, executes one transfer
//! and prints the result as JSON.

use anyhow::{Context, bail};

use simple_ledger::config::AppConfig;
use simple_ledger::db::Database;
use simple_ledger::ledger::{PgLedgerStore, TransferEngine, TransferParams};

fn get_env(args: &[String]) -> String {
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// `transfer <from> <to> <amount>` if present on the command line
fn get_transfer(args: &[String]) -> anyhow::Result<Option<TransferParams>> {
    let Some(pos) = args.iter().position(|a| a == "transfer") else {
        return Ok(None);
    };
    let rest = &args[pos + 1..];
    if rest.len() < 3 {
        bail!("usage: transfer <from_account_id> <to_account_id> <amount>");
    }
    let from: i64 = rest[0].parse().context("invalid from_account_id")?;
    let to: i64 = rest[1].parse().context("invalid to_account_id")?;
    let amount: i64 = rest[2].parse().context("invalid amount")?;
    Ok(Some(TransferParams::new(from, to, amount)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let env = get_env(&args);

    let app_config = AppConfig::load(&env)?;
    let _log_guard = simple_ledger::logging::init_logging(&app_config);
    tracing::info!(env = %env, "Starting simple_ledger");

    let transfer = get_transfer(&args)?;

    let db = Database::connect(&app_config.database)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.apply_schema().await.context("Failed to apply schema")?;
    db.health_check().await.context("Health check failed")?;

    let Some(params) = transfer else {
        tracing::info!("Database ready, no transfer requested");
        return Ok(());
    };

    let mut engine = TransferEngine::new(PgLedgerStore::new(db.pool().clone()));
    if let Some(limit) = app_config.engine.transfer_timeout() {
        engine = engine.with_timeout(limit);
    }

    let result = engine
        .execute_transfer(params)
        .await
        .with_context(|| {
            format!(
                "transfer {} -> {} of {} failed",
                params.from_account_id, params.to_account_id, params.amount
            )
        })?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
