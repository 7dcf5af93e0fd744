use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use pixledger::application::engine::{Collaborators, PaymentEngine};
use pixledger::application::report::BatchReport;
use pixledger::config::{GatewayKind, LedgerConfig};
use pixledger::domain::clock::{ClockHandle, SystemClock};
use pixledger::domain::gateway::GatewayHandle;
use pixledger::domain::ports::StorageHandle;
use pixledger::infrastructure::directory::{LogNotifier, StaticDirectory};
use pixledger::infrastructure::gateway::{HttpGateway, SimulatedGateway};
use pixledger::infrastructure::in_memory::InMemoryStore;
use pixledger::interfaces::csv::report_writer::ReportWriter;
use pixledger::interfaces::csv::sale_reader::SaleReader;
use pixledger::interfaces::http;
use pixledger::telemetry;
use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: LedgerConfig,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "PIXLEDGER_DB_PATH")]
    db_path: Option<PathBuf>,

    /// JSON file with the pack catalog and creator accounts.
    #[arg(long, env = "PIXLEDGER_DIRECTORY")]
    directory: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API and the gateway webhook.
    Serve {
        #[arg(long, env = "PIXLEDGER_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
    },
    /// Move proceeds whose holding period has elapsed from frozen to available.
    Release,
    /// Synchronise pending payments and open payouts with the gateway.
    Poll,
    /// Expire pending payments past their charge expiry.
    Expire,
    /// Re-derive wallet balances from payment and payout records.
    Reconcile {
        /// Report the corrections without writing them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print every wallet's balances.
    Balances,
    /// Replay a CSV of `buyer,pack` purchases through the simulated gateway.
    Sale {
        /// Input sales CSV file
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_json);

    let policy = cli.config.policy().into_diagnostic()?;
    let clock: ClockHandle = Arc::new(SystemClock);
    let store = open_store(cli.db_path.as_deref())?;

    let directory = Arc::new(match &cli.directory {
        Some(path) => StaticDirectory::load(path).into_diagnostic()?,
        None => StaticDirectory::new(),
    });

    let simulated = match cli.config.gateway {
        GatewayKind::Simulated => Some(Arc::new(SimulatedGateway::new(
            clock.clone(),
            cli.config.simulated_settings(),
            cli.config.simulated_webhook_secret(),
        ))),
        GatewayKind::Http => None,
    };
    let gateway: GatewayHandle = match &simulated {
        Some(sim) => sim.clone(),
        None => {
            let config = cli.config.http_gateway().into_diagnostic()?;
            Arc::new(HttpGateway::new(config).into_diagnostic()?)
        }
    };

    let engine = PaymentEngine::new(
        store,
        gateway,
        clock,
        policy,
        Collaborators {
            catalog: directory.clone(),
            directory,
            notifier: Arc::new(LogNotifier),
        },
    );

    let stdout = io::stdout();
    match cli.command {
        Command::Serve { bind } => {
            http::serve(engine, bind).await.into_diagnostic()?;
        }
        Command::Release => {
            let report = engine.release_job().run().await.into_diagnostic()?;
            write_batches(&[report])?;
        }
        Command::Poll => {
            let payments = engine.payments().poll_pending().await.into_diagnostic()?;
            let payouts = engine.payouts().poll_open().await.into_diagnostic()?;
            write_batches(&[payments, payouts])?;
        }
        Command::Expire => {
            let report = engine.payments().expire_stale().await.into_diagnostic()?;
            write_batches(&[report])?;
        }
        Command::Reconcile { dry_run } => {
            let report = engine.reconciliation().run(dry_run).await.into_diagnostic()?;
            ReportWriter::new(stdout.lock())
                .write_corrections(&report)
                .into_diagnostic()?;
        }
        Command::Balances => {
            let summaries = engine.wallets().summaries().await.into_diagnostic()?;
            ReportWriter::new(stdout.lock())
                .write_summaries(&summaries)
                .into_diagnostic()?;
        }
        Command::Sale { input } => {
            let Some(simulated) = simulated else {
                return Err(miette::miette!("`sale` needs the simulated gateway"));
            };
            let report = replay_sales(&engine, &simulated, &input).await?;
            report.log_summary();
            let summaries = engine.wallets().summaries().await.into_diagnostic()?;
            ReportWriter::new(stdout.lock())
                .write_summaries(&summaries)
                .into_diagnostic()?;
        }
    }

    Ok(())
}

fn open_store(db_path: Option<&Path>) -> Result<StorageHandle> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = pixledger::infrastructure::rocksdb::RocksDBStore::open(path);
            Ok(Arc::new(store.into_diagnostic()?))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryStore::new()))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

fn write_batches(reports: &[BatchReport]) -> Result<()> {
    let mut writer = ReportWriter::new(io::stdout().lock());
    for report in reports {
        writer.write_batch(report).into_diagnostic()?;
    }
    Ok(())
}

/// Checkout, approve and apply each sale. Bad rows are reported, not fatal.
async fn replay_sales(
    engine: &PaymentEngine,
    simulated: &SimulatedGateway,
    input: &Path,
) -> Result<BatchReport> {
    let file = File::open(input).into_diagnostic()?;
    let mut report = BatchReport::new("sale");
    for (row, sale) in SaleReader::new(file).sales().enumerate() {
        let subject = format!("row {}", row + 1);
        let sale = match sale {
            Ok(sale) => sale,
            Err(e) => {
                report.failed(subject, &e);
                continue;
            }
        };
        let applied = async {
            let checkout = engine
                .payments()
                .create_checkout(&sale.buyer, &sale.pack)
                .await?;
            let payment = engine.payments().payment(checkout.payment_id).await?;
            simulated.approve_charge(&payment.gateway_id).await?;
            engine.payments().sync_payment(checkout.payment_id).await
        }
        .await;
        match applied {
            Ok(_) => report.processed(),
            Err(e) => report.failed(subject, &e),
        }
    }
    Ok(report)
}
