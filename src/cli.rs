//! CLI argument parsing for the replay binary

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Output format for the end-of-run summary
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "memoria")]
#[command(version)]
#[command(about = "Replay a recorded defect trace through the dedup/suppression engine", long_about = None)]
pub struct Cli {
    /// User suppression file(s), loaded in order after the default file
    #[arg(short = 's', long = "suppress", value_name = "FILE")]
    pub suppress: Vec<PathBuf>,

    /// Default-policy suppression file, loaded first
    #[arg(long = "default-suppress", value_name = "FILE")]
    pub default_suppress: Option<PathBuf>,

    /// Write ready-to-load suppression patterns for unmatched defects
    #[arg(long = "gen-suppressions", value_name = "FILE")]
    pub gen_suppressions: Option<PathBuf>,

    /// Include the <module+0xoffset> form in generated patterns
    #[arg(long = "gen-offs")]
    pub gen_offs: bool,

    /// Maximum errors reported before throttling (0 disables the cap)
    #[arg(long = "report-max", value_name = "N")]
    pub report_max: Option<u32>,

    /// Maximum leaks counted before throttling (0 disables the cap)
    #[arg(long = "report-leak-max", value_name = "N")]
    pub report_leak_max: Option<u32>,

    /// Count leaks without deduplication or suppression
    #[arg(long = "no-check-leaks")]
    pub no_check_leaks: bool,

    /// Hide possible leaks (they are still counted)
    #[arg(long = "no-possible-leaks")]
    pub no_possible_leaks: bool,

    /// Report still-reachable allocations
    #[arg(long = "show-reachable")]
    pub show_reachable: bool,

    /// Omit addresses and auxiliary notes from report blocks
    #[arg(long)]
    pub brief: bool,

    /// Verbosity (repeat for more; at -vv suppressed defects are shown)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Include default-policy suppression usage in the summary
    #[arg(long = "full-stats")]
    pub full_stats: bool,

    /// Output format for the summary
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug tracing to stderr
    #[arg(long)]
    pub debug: bool,

    /// Defect trace to replay (JSON lines; use - for stdin)
    #[arg(value_name = "TRACE")]
    pub trace: PathBuf,
}
