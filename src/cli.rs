use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "awsctl")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Run AWS CLI calls with layered config, retries and rate limits", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration profile to use
    #[arg(long, global = true, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Environment whose scoped config layers apply
    #[arg(long = "env", global = true, env = "AWSCTL_ENV")]
    pub environment: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute one AWS CLI call
    Run(RunArgs),

    /// Show how the AWS CLI will authenticate
    Auth {
        /// Exit non-zero when no credentials are found
        #[arg(long)]
        require: bool,
    },

    /// Show the resolved region and where it came from
    Region {
        /// Per-call region override
        #[arg(long)]
        region: Option<String>,
    },

    /// Inspect layered configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Manage the persisted profile selection
    #[command(subcommand)]
    Profile(ProfileCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Run
// ============================================================================

#[derive(Parser)]
pub struct RunArgs {
    /// Service the call targets (used for rate limits and scoped config)
    #[arg(short, long)]
    pub service: String,

    /// Region override for this call
    #[arg(long)]
    pub region: Option<String>,

    /// Per-attempt timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum number of retries
    #[arg(long)]
    pub retries: Option<u32>,

    /// Maximum captured output (e.g. 512KB, 2MB)
    #[arg(long)]
    pub max_output: Option<String>,

    /// Print the structured result as JSON
    #[arg(long)]
    pub json: bool,

    /// Treat the first argument as the program instead of prefixing `aws`
    #[arg(long)]
    pub program: bool,

    /// Refuse to run when no credentials are detected
    #[arg(long)]
    pub require_credentials: bool,

    /// Arguments passed to the AWS CLI
    #[arg(last = true, required = true)]
    pub args: Vec<String>,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the merged configuration with the layer each value came from
    Show {
        /// Service whose scoped layers apply
        #[arg(long)]
        service: Option<String>,
    },

    /// Show config file locations
    Paths,
}

// ============================================================================
// Profile Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// Show the active profile and where it was selected
    Show,

    /// Persist a profile selection
    Use {
        /// Profile name
        name: String,
    },

    /// Forget the persisted profile selection
    Clear,
}
