use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use paysync::application::payments::PaymentService;
use paysync::application::pipeline::{OrchestrationPipeline, PaymentRequest};
use paysync::application::reconciler::ReconciliationEngine;
use paysync::config::{
    AppConfig, CaptureMethod, DEFAULT_API_BASE, DEFAULT_IMPORT_LIMIT, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_SYNC_INTERVAL, GatewayConfig, GatewayMode, ReconcilerConfig,
};
use paysync::domain::card::{PaymentMethodRef, TEST_CARDS};
use paysync::domain::payment::{Amount, Currency};
use paysync::domain::ports::{GatewayRef, LedgerRef};
use paysync::domain::status::PaymentStatus;
use paysync::infrastructure::in_memory::InMemoryLedger;
use paysync::infrastructure::simulated::SimulatedGateway;
use paysync::infrastructure::stripe::StripeGateway;
use paysync::interfaces::csv::request_reader::PaymentRequestReader;
use paysync::interfaces::csv::writer::RecordWriter;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Processor secret key.
    #[arg(long, env = "STRIPE_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Processor API base URL.
    #[arg(long, env = "PAYSYNC_API_BASE", default_value = DEFAULT_API_BASE, global = true)]
    api_base: String,

    /// Per-request timeout towards the processor, in seconds.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs(), global = true)]
    timeout_secs: u64,

    /// Stop confirmed payments at `requires_capture` instead of capturing on confirm.
    #[arg(long, global = true)]
    manual_capture: bool,

    /// Use the in-process simulated processor instead of the remote API.
    #[arg(long, global = true)]
    sandbox: bool,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "PAYSYNC_DB_PATH", global = true)]
    db_path: Option<PathBuf>,

    /// Seconds between reconciliation passes.
    #[arg(long, default_value_t = DEFAULT_SYNC_INTERVAL.as_secs(), global = true)]
    sync_interval_secs: u64,

    /// How many recent remote payments the import phase looks at.
    #[arg(long, default_value_t = DEFAULT_IMPORT_LIMIT, global = true)]
    import_limit: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create, confirm and optionally capture a payment in one go.
    Process {
        /// Amount in minor units.
        amount: i64,
        /// Payment method reference (pm_...) or test card number.
        payment_method: String,
        #[arg(long, default_value = "usd")]
        currency: String,
        #[arg(long)]
        auto_capture: bool,
    },
    /// Run `process` for every row of a CSV file.
    ProcessBatch {
        /// CSV with columns amount,currency,payment_method,auto_capture
        input: PathBuf,
    },
    Create {
        amount: i64,
        #[arg(long, default_value = "usd")]
        currency: String,
    },
    Confirm {
        id: String,
        payment_method: String,
    },
    Capture {
        id: String,
    },
    Cancel {
        id: String,
    },
    /// Change the amount of a payment that has not been confirmed yet.
    Update {
        id: String,
        amount: i64,
    },
    /// Fetch one payment from the processor and mirror it locally.
    Get {
        id: String,
    },
    /// List payments on the processor.
    List {
        #[arg(long, default_value_t = 30)]
        limit: u32,
        #[arg(long)]
        starting_after: Option<String>,
    },
    /// List payments in the local ledger.
    Ledger {
        #[arg(long = "status")]
        statuses: Vec<String>,
    },
    /// Status history of one payment, newest first.
    History {
        id: String,
    },
    /// Run one reconciliation pass.
    Sync,
    /// Reconcile periodically until interrupted.
    Serve,
    /// List the sandbox test cards.
    Cards,
}

impl Cli {
    fn config(&self) -> AppConfig {
        let capture_method = if self.manual_capture {
            CaptureMethod::Manual
        } else {
            CaptureMethod::Automatic
        };

        let gateway = if self.sandbox {
            GatewayMode::Sandbox(capture_method)
        } else {
            GatewayMode::Remote(GatewayConfig {
                api_key: self.api_key.clone().unwrap_or_default(),
                api_base: self.api_base.clone(),
                timeout: Duration::from_secs(self.timeout_secs),
                capture_method,
            })
        };

        AppConfig {
            gateway,
            reconciler: ReconcilerConfig {
                interval: Duration::from_secs(self.sync_interval_secs),
                import_limit: self.import_limit,
            },
            db_path: self.db_path.clone(),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn build_ledger(db_path: Option<&Path>) -> Result<LedgerRef> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(path) = db_path {
        let ledger = paysync::infrastructure::rocksdb::RocksDbLedger::open(path)?;
        return Ok(Arc::new(ledger));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }

    Ok(Arc::new(InMemoryLedger::new()))
}

fn build_gateway(mode: &GatewayMode) -> Result<GatewayRef> {
    match mode {
        GatewayMode::Remote(config) => Ok(Arc::new(StripeGateway::new(config)?)),
        GatewayMode::Sandbox(capture_method) => {
            info!("using the simulated processor");
            Ok(Arc::new(SimulatedGateway::new(*capture_method)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let mut out = RecordWriter::new(io::stdout().lock());

    // Needs neither storage nor the processor.
    if let Command::Cards = cli.command {
        out.write_cards(TEST_CARDS)?;
        return Ok(());
    }

    let config = cli.config();
    config.validate()?;

    let ledger = build_ledger(config.db_path.as_deref())?;
    let gateway = build_gateway(&config.gateway)?;
    let service = PaymentService::new(ledger.clone(), gateway.clone());
    let pipeline = OrchestrationPipeline::new(ledger.clone(), gateway.clone());
    let engine = Arc::new(ReconciliationEngine::new(
        ledger,
        gateway,
        config.reconciler.clone(),
    ));

    match cli.command {
        Command::Process {
            amount,
            payment_method,
            currency,
            auto_capture,
        } => {
            let request = PaymentRequest {
                amount: Amount::new(amount)?,
                currency: Currency::new(&currency)?,
                payment_method: PaymentMethodRef::parse(&payment_method),
                auto_capture,
            };
            let outcome = pipeline.process_payment(request).await?;
            out.write_outcomes([&outcome])?;
        }
        Command::ProcessBatch { input } => {
            let file = File::open(input).into_diagnostic()?;
            let reader = PaymentRequestReader::new(file);
            for (row, request) in reader.requests().enumerate() {
                let request = match request {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(row = row + 1, error = %e, "Error reading payment request");
                        continue;
                    }
                };
                match pipeline.process_payment(request).await {
                    Ok(outcome) => out.write_outcomes([&outcome])?,
                    Err(e) => warn!(row = row + 1, error = %e, "Error processing payment"),
                }
            }
        }
        Command::Create { amount, currency } => {
            let intent = service
                .create(Amount::new(amount)?, Currency::new(&currency)?)
                .await?;
            out.write_intents([&intent])?;
        }
        Command::Confirm { id, payment_method } => {
            let intent = service
                .confirm(&id, &PaymentMethodRef::parse(&payment_method))
                .await?;
            out.write_intents([&intent])?;
        }
        Command::Capture { id } => {
            let intent = service.capture(&id).await?;
            out.write_intents([&intent])?;
        }
        Command::Cancel { id } => {
            let intent = service.cancel(&id).await?;
            out.write_intents([&intent])?;
        }
        Command::Update { id, amount } => {
            let intent = service.update_amount(&id, Amount::new(amount)?).await?;
            out.write_intents([&intent])?;
        }
        Command::Get { id } => {
            let intent = service.retrieve(&id).await?;
            out.write_intents([&intent])?;
        }
        Command::List {
            limit,
            starting_after,
        } => {
            let intents = service.list_remote(limit, starting_after.as_deref()).await?;
            out.write_intents(&intents)?;
        }
        Command::Ledger { statuses } => {
            let statuses: Vec<PaymentStatus> =
                statuses.iter().map(|s| PaymentStatus::from(s.as_str())).collect();
            let payments = service.list_local(&statuses).await?;
            out.write_payments(&payments)?;
        }
        Command::History { id } => {
            let (_payment, history) = service.history(&id).await?;
            out.write_history(&history)?;
        }
        Command::Sync => {
            let report = engine.run_once().await;
            out.write_report(&report)?;
        }
        Command::Serve => {
            let handle = engine.start();
            tokio::signal::ctrl_c().await.into_diagnostic()?;
            info!("shutdown requested");
            handle.stop().await;
        }
        Command::Cards => {}
    }

    Ok(())
}
