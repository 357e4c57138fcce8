use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use memoria::cli::{Cli, OutputFormat};
use memoria::config::ReportConfig;
use memoria::engine::{DefectReport, LeakReport, ReportEngine, StackInput};
use memoria::format::ReportScratch;
use memoria::suppress::Provenance;
use memoria::trace::{TraceEvent, TraceSymbolizer};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Read a JSON-lines trace from a file or stdin ("-")
fn read_trace(path: &Path) -> Result<Vec<TraceEvent>> {
    let mut text = String::new();
    if path.as_os_str() == "-" {
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read trace from stdin")?;
    } else {
        let file = File::open(path)
            .with_context(|| format!("failed to open trace {}", path.display()))?;
        BufReader::new(file)
            .read_to_string(&mut text)
            .with_context(|| format!("failed to read trace {}", path.display()))?;
    }
    let mut events = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event: TraceEvent = serde_json::from_str(line)
            .with_context(|| format!("malformed trace event at line {}", lineno + 1))?;
        events.push(event);
    }
    Ok(events)
}

/// Map a "0 disables the cap" CLI value onto the config option
fn cap(cli_value: Option<u32>, default: Option<u32>) -> Option<u32> {
    match cli_value {
        Some(0) => None,
        Some(n) => Some(n),
        None => default,
    }
}

fn config_from(cli: &Cli) -> ReportConfig {
    let defaults = ReportConfig::default();
    ReportConfig {
        report_max: cap(cli.report_max, defaults.report_max),
        report_leak_max: cap(cli.report_leak_max, defaults.report_leak_max),
        check_leaks: !cli.no_check_leaks,
        possible_leaks: !cli.no_possible_leaks,
        show_reachable: cli.show_reachable,
        brief: cli.brief,
        verbose: cli.verbose.max(1),
        gen_suppress_offs: cli.gen_offs,
        ..defaults
    }
}

fn replay(engine: &ReportEngine, events: &[TraceEvent]) {
    let mut scratch = ReportScratch::new();
    for event in events {
        match event {
            TraceEvent::Defect {
                category,
                address,
                size,
                is_write,
                container,
                instruction,
                routine,
                thread,
                frames,
            } => {
                let addresses: Vec<u64> = frames.iter().map(|f| f.address).collect();
                engine.report_defect(
                    &mut scratch,
                    &DefectReport {
                        category: *category,
                        address: *address,
                        size: *size,
                        is_write: *is_write,
                        container: *container,
                        stack: StackInput::Captured(&addresses),
                        instruction: instruction.as_deref(),
                        routine: routine.as_deref(),
                        thread_id: *thread,
                    },
                );
            }
            TraceEvent::Leak {
                known_allocation,
                address,
                size,
                indirect_size,
                early,
                reachable,
                maybe_reachable,
                frames,
            } => {
                let addresses: Vec<u64> = frames.iter().map(|f| f.address).collect();
                engine.report_leak(
                    &mut scratch,
                    &LeakReport {
                        known_allocation: *known_allocation,
                        address: *address,
                        size: *size,
                        indirect_size: *indirect_size,
                        early: *early,
                        reachable: *reachable,
                        maybe_reachable: *maybe_reachable,
                        stack: StackInput::Captured(&addresses),
                    },
                );
            }
            TraceEvent::Checkpoint => engine.checkpoint(),
            TraceEvent::Revert => engine.revert(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let events = read_trace(&cli.trace)?;
    let symbolizer = TraceSymbolizer::from_events(&events);

    let mut engine = ReportEngine::new(config_from(&cli), Box::new(symbolizer));
    engine.set_report_sink(Box::new(std::io::stdout()));
    if let Some(path) = &cli.gen_suppressions {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        engine.set_pattern_sink(Box::new(file));
    }

    if let Some(path) = &cli.default_suppress {
        engine
            .load_suppression_file(path, Provenance::Default)
            .with_context(|| format!("failed to load default suppressions {}", path.display()))?;
    }
    for path in &cli.suppress {
        engine
            .load_suppression_file(path, Provenance::User)
            .with_context(|| format!("failed to load suppressions {}", path.display()))?;
    }

    replay(&engine, &events);

    match cli.format {
        OutputFormat::Text => engine.emit_summary(cli.full_stats),
        OutputFormat::Json => {
            let data = engine.summary_data();
            println!(
                "{}",
                serde_json::to_string_pretty(&data).context("failed to encode summary")?
            );
        }
    }
    Ok(())
}
