use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "api-gov")]
#[command(about = "API governance pipeline: discover, harvest, lint, and score a fleet's OpenAPI surface")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Override STORAGE_PATH / config.storage_path for this invocation.
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline per RUN_MODE (continuous scheduler or a single cycle).
    Run,

    /// Run exactly one discovery/harvest/lint/aggregate cycle and print a report.
    Check {
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },

    /// Serve the REST + metrics adapter over the scheduler (implies continuous mode).
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: String,
    },

    /// Print the fleet-wide compliance report for the most recent cycle's cache.
    Report {
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    Text,
    Json,
    Markdown,
}
