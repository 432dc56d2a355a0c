use std::{
    error::Error,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

use cdc_kinesis::{
    conversions::trigger::{CdcRequest, SnsEvent},
    handler::handle_event,
    pipeline::{
        destinations::kinesis::KinesisWriter,
        dispatcher::{Dispatcher, DispatcherConfig, DEFAULT_REGION_NAME, DEFAULT_STREAM_NAME},
        retry::RetryPolicy,
        sources::postgres::PostgresConnector,
    },
};
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "cdc_kinesis", version, about, arg_required_else_help = true)]
struct AppArgs {
    #[clap(flatten)]
    stream_args: StreamArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct StreamArgs {
    /// Log PutRecords requests instead of sending them
    #[arg(long, env = "DRY_RUN")]
    dry_run: bool,

    /// Region of the Kinesis stream
    #[arg(long, env = "REGION_NAME", default_value = DEFAULT_REGION_NAME)]
    region_name: String,

    /// Kinesis stream to write to
    #[arg(long, env = "KINESIS_STREAM_NAME", default_value = DEFAULT_STREAM_NAME)]
    stream_name: String,

    /// Seed for partition keys, random when unset
    #[arg(long, env = "PARTITION_KEY_SEED")]
    partition_key_seed: Option<u64>,

    /// PutRecords attempts per batch
    #[arg(long, env = "MAX_ATTEMPTS", default_value_t = RetryPolicy::DEFAULT_MAX_ATTEMPTS)]
    max_attempts: usize,

    /// Seconds to wait between attempts
    #[arg(long, env = "RETRY_DELAY_SECS", default_value_t = RetryPolicy::DEFAULT_DELAY.as_secs())]
    retry_delay_secs: u64,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Handle an SNS event read from a file, or from stdin with `-`
    Handle {
        #[arg(long, default_value = "-")]
        event: PathBuf,
    },
    /// Handle a synthetic SNS event built from the given request
    Harness(HarnessArgs),
}

#[derive(Debug, Args)]
struct HarnessArgs {
    /// Host on which Postgres is running
    #[arg(long)]
    db_host: String,

    /// Port on which Postgres is running
    #[arg(long, default_value_t = 5432)]
    db_port: u16,

    /// Postgres database user name
    #[arg(long)]
    db_user: String,

    /// Postgres database user password
    #[arg(long, env = "DB_PASSWORD")]
    db_password: String,

    /// Postgres database name
    #[arg(long)]
    database: String,

    /// Schema of the source table
    #[arg(long)]
    schema: Option<String>,

    /// Source table
    #[arg(long)]
    table: String,

    /// SELECT list
    #[arg(long, default_value = "*")]
    columns: String,

    /// WHERE predicate
    #[arg(long, default_value = "true")]
    where_clause: String,

    /// Rows per PutRecords call
    #[arg(long, default_value_t = 100)]
    kinesis_max_put_records: usize,
}

impl From<StreamArgs> for DispatcherConfig {
    fn from(args: StreamArgs) -> Self {
        DispatcherConfig {
            dry_run: args.dry_run,
            region_name: args.region_name,
            stream_name: args.stream_name,
            partition_key_seed: args.partition_key_seed,
            retry_policy: RetryPolicy::new(
                args.max_attempts,
                Duration::from_secs(args.retry_delay_secs),
            ),
        }
    }
}

impl HarnessArgs {
    fn into_event(self) -> Result<SnsEvent, serde_json::Error> {
        let subject = format!("CDC from {}.{}", self.database, self.table);
        let request = CdcRequest {
            db_host: self.db_host,
            db_port: self.db_port,
            db_user: self.db_user,
            db_password: self.db_password,
            database: self.database,
            schema: self.schema,
            table: self.table,
            columns: self.columns,
            where_clause: self.where_clause,
            kinesis_max_put_records: self.kinesis_max_put_records,
        };
        Ok(SnsEvent::single(subject, serde_json::to_string(&request)?))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    if let Err(e) = main_impl().await {
        error!("{e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn read_event(path: &Path) -> Result<SnsEvent, Box<dyn Error>> {
    let raw = if path.as_os_str() == "-" {
        let mut raw = String::new();
        tokio::io::stdin().read_to_string(&mut raw).await?;
        raw
    } else {
        tokio::fs::read_to_string(path).await?
    };
    Ok(raw.parse::<SnsEvent>()?)
}

async fn main_impl() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let args = AppArgs::parse();

    let event = match args.command {
        Command::Handle { event } => read_event(&event).await?,
        Command::Harness(harness_args) => harness_args.into_event()?,
    };

    let config = DispatcherConfig::from(args.stream_args);
    info!(
        "writing to kinesis stream {} in {}{}",
        config.stream_name,
        config.region_name,
        if config.dry_run { " (dry run)" } else { "" }
    );

    let writer = KinesisWriter::from_region(&config.region_name).await;
    let mut dispatcher = Dispatcher::new(config, writer);

    let summary = handle_event(&event, &mut dispatcher, &PostgresConnector).await?;

    info!(
        "done: {} rows in {} batches",
        summary.rows, summary.batches
    );

    Ok(())
}
