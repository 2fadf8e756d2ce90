use clap::Parser;
use miette::{IntoDiagnostic, Result};
use payout_ledger::application::commissions::CommissionCrediting;
use payout_ledger::application::ledger::BalanceLedger;
use payout_ledger::application::payouts::PayoutLifecycle;
use payout_ledger::config::LedgerConfig;
use payout_ledger::domain::ports::{BalanceStoreBox, PayoutStoreBox, SharedCommissionStore};
use payout_ledger::infrastructure::events::TracingEventSink;
use payout_ledger::infrastructure::in_memory::{
    InMemoryBalanceStore, InMemoryCommissionStore, InMemoryPayoutStore,
};
use payout_ledger::infrastructure::processors::registry_from_config;
use payout_ledger::interfaces::csv::operation_reader::OperationReader;
use payout_ledger::interfaces::csv::operation_runner::OperationRunner;
use payout_ledger::interfaces::csv::report_writer::ReportWriter;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Payout method for new payouts (overrides PAYOUT_DEFAULT_METHOD)
    #[arg(long)]
    method: Option<String>,

    /// Write the final state of all payouts to this CSV file
    #[arg(long)]
    payouts: Option<PathBuf>,
}

struct Stores {
    balances: BalanceStoreBox,
    payouts: PayoutStoreBox,
    commissions: SharedCommissionStore,
}

fn in_memory_stores() -> Stores {
    Stores {
        balances: Box::new(InMemoryBalanceStore::new()),
        payouts: Box::new(InMemoryPayoutStore::new()),
        commissions: Arc::new(InMemoryCommissionStore::new()),
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    use payout_ledger::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            Ok(Stores {
                balances: Box::new(store.clone()),
                payouts: Box::new(store.clone()),
                commissions: Arc::new(store),
            })
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' \
             feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = LedgerConfig::from_env().into_diagnostic()?;
    let stores = open_stores(cli.db_path)?;

    let ledger = Arc::new(BalanceLedger::new(stores.balances));
    let payouts = PayoutLifecycle::new(
        Arc::clone(&ledger),
        stores.payouts,
        Arc::clone(&stores.commissions),
        registry_from_config(&config),
        Box::new(TracingEventSink),
        config,
    );
    // A persistent store may hold payouts a previous run never settled.
    let recovered = payouts.recover_interrupted().await.into_diagnostic()?;
    if recovered > 0 {
        warn!(count = recovered, "failed payouts left in processing by a previous run");
    }
    let commissions = CommissionCrediting::new(
        Arc::clone(&ledger),
        stores.commissions,
        Box::new(TracingEventSink),
    );
    let mut runner = OperationRunner::new(ledger, payouts, commissions, cli.method);

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for op_result in reader.operations() {
        match op_result {
            Ok(op) => {
                if let Err(e) = runner.apply(op).await {
                    eprintln!("Error processing operation: {}", e);
                }
            }
            Err(e) => {
                eprintln!("Error reading operation: {}", e);
            }
        }
    }
    runner.finish().await;

    let balances = runner.balances().await.into_diagnostic()?;
    let stdout = io::stdout();
    ReportWriter::new(stdout.lock())
        .write_balances(&balances)
        .into_diagnostic()?;

    if let Some(path) = cli.payouts {
        let payouts = runner.payouts().all().await.into_diagnostic()?;
        ReportWriter::new(File::create(path).into_diagnostic()?)
            .write_payouts(&payouts)
            .into_diagnostic()?;
    }

    Ok(())
}
