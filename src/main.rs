use anyhow::{Context, Result};
use automl_client::{
    commands::{self, OutputFormat},
    config::{Config, DEFAULT_TIMEOUT_SECS},
    http::{MAX_RETRIES, RetryPolicy},
    task::{ModelKey, ModelReference, StatusRoute, WaitPolicy, wait::DEFAULT_POLL_INTERVAL_SECS},
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// automl - client for an AutoML training and prediction service
///
/// Uploads CSV training sets, tracks training tasks and scores CSV files
/// with the resulting models.
///
/// Examples:
///   automl --base-url http://localhost:8000 train iris.csv --wait
///   automl predict new.csv --model-path /models/iris
///   automl run iris.csv new.csv --format json
#[derive(Parser, Debug)]
#[command(author, version = env!("AUTOML_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base URL of the AutoML service (also via AUTOML_BASE_URL)
    #[arg(long = "base-url", env = "AUTOML_BASE_URL", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Timeout for each HTTP attempt in seconds, 0 for none
    #[arg(
        long,
        env = "AUTOML_TIMEOUT",
        value_name = "SECS",
        default_value_t = DEFAULT_TIMEOUT_SECS,
        global = true
    )]
    pub timeout: u64,

    /// Retries after a failed first attempt (connection errors, timeouts, 5xx)
    #[arg(long, value_name = "N", default_value_t = MAX_RETRIES, global = true)]
    pub retries: usize,

    /// Status endpoint exposed by the service: monitor or status
    #[arg(long = "status-route", value_name = "ROUTE", default_value = "monitor", global = true)]
    pub status_route: StatusRoute,

    /// How /predict identifies the model: modelpath or task-id
    #[arg(long = "model-key", value_name = "KEY", default_value = "modelpath", global = true)]
    pub model_key: ModelKey,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Upload a CSV training set
    Train(TrainArgs),

    /// Show the current state of a training task
    Status(StatusArgs),

    /// Poll a training task until it finishes
    Wait(WaitArgs),

    /// Score a CSV file with a trained model
    Predict(PredictArgs),

    /// Train, wait for the model, then score a second CSV file
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct PollArgs {
    /// Seconds between status polls
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub interval: u64,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,
}

impl PollArgs {
    fn policy(&self) -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_secs(self.interval),
            deadline: self.deadline.map(Duration::from_secs),
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct TrainArgs {
    /// CSV file with a header row
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Wait for the task to finish when training runs in the background
    #[arg(long)]
    pub wait: bool,

    #[command(flatten)]
    pub poll: PollArgs,
}

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    #[arg(value_name = "TASK_ID")]
    pub task_id: String,
}

#[derive(clap::Args, Debug)]
pub struct WaitArgs {
    #[arg(value_name = "TASK_ID")]
    pub task_id: String,

    #[command(flatten)]
    pub poll: PollArgs,
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ModelArgs {
    /// Model path returned by training
    #[arg(long = "model-path", value_name = "PATH")]
    pub model_path: Option<String>,

    /// Id of the task that trained the model
    #[arg(long = "task-id", value_name = "ID")]
    pub task_id: Option<String>,
}

impl ModelArgs {
    fn reference(&self) -> Option<ModelReference> {
        match (&self.model_path, &self.task_id) {
            (Some(path), _) => Some(ModelReference::model_path(path)),
            (None, Some(id)) => Some(ModelReference::task_id(id)),
            (None, None) => None,
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct OutputArgs {
    /// Output format: table, json or csv
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub format: OutputFormat,

    /// Write predictions to this file instead of stdout
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct PredictArgs {
    /// CSV file with a header row
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[arg(value_name = "TRAIN_FILE")]
    pub train_file: PathBuf,

    #[arg(value_name = "PREDICT_FILE")]
    pub predict_file: PathBuf,

    #[command(flatten)]
    pub poll: PollArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let base_url = self
            .base_url
            .clone()
            .context("No service URL given. Pass --base-url or set AUTOML_BASE_URL.")?;

        let mut config = Config::new(base_url);
        config.timeout = Duration::from_secs(self.timeout);
        config.retry = RetryPolicy::with_retries(self.retries);
        config.status_route = self.status_route;
        config.model_key = self.model_key;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let service = cli.config()?.client()?;
    let runtime = automl_client::runtime::RealRuntime;

    match cli.command {
        Commands::Train(args) => {
            let policy = args.poll.policy();
            let wait = args.wait.then_some(&policy);
            commands::train(&runtime, &service, &args.file, wait).await?
        }
        Commands::Status(args) => commands::status(&service, &args.task_id).await?,
        Commands::Wait(args) => {
            commands::wait(&service, &args.task_id, &args.poll.policy()).await?
        }
        Commands::Predict(args) => {
            let model_reference = args
                .model
                .reference()
                .context("Pass --model-path or --task-id")?;
            commands::predict(
                &runtime,
                &service,
                &args.file,
                &model_reference,
                args.output.format,
                args.output.output.as_deref(),
            )
            .await?
        }
        Commands::Run(args) => {
            commands::run(
                &runtime,
                &service,
                &args.train_file,
                &args.predict_file,
                &args.poll.policy(),
                args.output.format,
                args.output.output.as_deref(),
            )
            .await?
        }
    }
    Ok(())
}
