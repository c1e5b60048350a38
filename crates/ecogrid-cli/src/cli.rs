use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a named scenario (or a saved topology file) for a number of ticks
    Run {
        /// Name of a built-in scenario, or a path to a saved topology JSON file
        #[arg(long)]
        scenario: String,
        /// Number of ticks to step
        #[arg(long, default_value_t = 10)]
        ticks: u64,
        /// Disable the sensor fabric's load-generation noise
        #[arg(long)]
        no_noise: bool,
        /// Save the resulting topology to this path after the run
        #[arg(long)]
        save_to: Option<String>,
    },
    /// List the named built-in scenarios
    Scenarios {},
}
