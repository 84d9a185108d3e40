use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "factorq", about = "Factor registry, evaluation queue and workers")]
pub struct Cli {
    /// Database URL; overrides DATABASE_URL
    #[arg(long, global = true)]
    pub db: Option<String>,
    #[command(subcommand)]
    pub command: AppCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AppCommand {
    /// Create the schema and optionally seed an empty registry from a JSON catalog
    InitDb {
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// Register a factor or append a new version to an existing one
    RegisterFactor {
        code: String,
        expression: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        owner: Option<String>,
        /// Comma separated
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Version note
        #[arg(long)]
        note: Option<String>,
    },
    /// Show active factors
    ListFactors,
    /// Show one factor with its version history
    ShowFactor { code: String },
    /// Hide a factor from listing and reject new jobs for it
    DeactivateFactor { code: String },
    /// Make a deactivated factor available again
    ActivateFactor { code: String },
    /// Submit an evaluation job
    SubmitJob {
        code: String,
        #[arg(long = "start")]
        start_date: String,
        #[arg(long = "end")]
        end_date: String,
        #[arg(long, default_value = "day")]
        freq: String,
        /// Comma separated instrument codes; empty means the provider default
        #[arg(long, default_value = "")]
        instruments: String,
        /// 1 (most urgent) to 10
        #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
        priority: i32,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        callback: Option<String>,
        #[arg(long)]
        version: Option<i32>,
        /// JSON object merged into the job context
        #[arg(long)]
        context: Option<String>,
    },
    /// Claim pending jobs (PENDING -> RUNNING)
    Dequeue {
        #[arg(long, default_value_t = 8)]
        limit: u64,
        #[arg(long, default_value = "cli")]
        worker: String,
    },
    /// Mark a job SUCCESS with metrics given as a JSON object
    CompleteJob {
        job_id: i32,
        #[arg(long)]
        metrics: String,
        #[arg(long)]
        result_path: Option<String>,
    },
    /// Mark a job FAILED
    FailJob {
        job_id: i32,
        #[arg(long = "error")]
        error_message: String,
    },
    /// Attach a result path to jobs regardless of status
    AttachResult { path: String, job_ids: Vec<i32> },
    /// List jobs, newest first
    ListJobs {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Show one job in full
    ShowJob { job_id: i32 },
    /// Job counts per status
    Stats,
    /// Best successful jobs by ICIR, then IC
    Summary {
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Run evaluation workers against the queue
    Worker {
        /// Process a single batch and exit
        #[arg(long)]
        once: bool,
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long)]
        panel_dir: Option<PathBuf>,
    },
}
