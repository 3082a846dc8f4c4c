use crate::config::load_config;
use crate::ir::Snapshot;
use crate::layout::{Diagnostic, LayeredEngine, Severity, compute_layout_blocking};
use crate::layout_dump::write_layout_dump;
use crate::snapshot::parse_snapshot;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(
    name = "opgl",
    version,
    about = "Lay out a debugger computation graph snapshot as positioned JSON"
)]
pub struct Args {
    /// Snapshot JSON file or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config file (JSON or JSON5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Draw from this symbol instead of the snapshot's head
    #[arg(long = "head")]
    pub head: Option<String>,

    /// Expand a container (repeatable)
    #[arg(long = "expand", value_name = "ID")]
    pub expand: Vec<String>,

    /// Collapse a container (repeatable)
    #[arg(long = "collapse", value_name = "ID")]
    pub collapse: Vec<String>,

    /// Single-line JSON instead of pretty-printed
    #[arg(long = "compact")]
    pub compact: bool,
}

pub fn run() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let input = read_input(args.input.as_deref())?;
    let mut snapshot = parse_snapshot(&input).context("reading snapshot")?;
    apply_overrides(&mut snapshot, &args);

    let engine = LayeredEngine::new(config.layout.clone());
    let layout = compute_layout_blocking(&snapshot, &config.layout, &engine)?;
    // Each diagnostic was already logged by the pipeline when it was raised.
    let (warnings, errors) = diagnostic_counts(&layout.diagnostics);
    tracing::info!(warnings, errors, "layout finished");
    write_layout_dump(args.output.as_deref(), &layout, !args.compact)
}

fn diagnostic_counts(diagnostics: &[Diagnostic]) -> (usize, usize) {
    diagnostics
        .iter()
        .fold((0, 0), |(warnings, errors), diagnostic| match diagnostic.severity {
            Severity::Warning => (warnings + 1, errors),
            Severity::Error => (warnings, errors + 1),
        })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed when embedded; keep it.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

fn apply_overrides(snapshot: &mut Snapshot, args: &Args) {
    if let Some(head) = &args.head {
        snapshot.head = head.clone();
    }
    for id in &args.expand {
        snapshot.set_expanded(id, true);
    }
    for id in &args.collapse {
        snapshot.set_expanded(id, false);
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path != Path::new("-") {
            return std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()));
        }
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_collapse_after_expand() {
        let args = Args::parse_from([
            "opgl", "--head", "D9", "--expand", "C", "--expand", "L", "--collapse", "L",
        ]);
        let mut snapshot = Snapshot::new("D0");
        apply_overrides(&mut snapshot, &args);
        assert_eq!(snapshot.head, "D9");
        assert!(snapshot.is_expanded("C", false));
        assert!(!snapshot.is_expanded("L", true));
    }

    #[test]
    fn diagnostics_are_counted_by_severity() {
        let diagnostic = |severity| Diagnostic {
            severity,
            node: None,
            message: String::new(),
        };
        let diagnostics = [
            diagnostic(Severity::Warning),
            diagnostic(Severity::Error),
            diagnostic(Severity::Warning),
        ];
        assert_eq!(diagnostic_counts(&diagnostics), (2, 1));
        assert_eq!(diagnostic_counts(&[]), (0, 0));
    }

    #[test]
    fn missing_input_files_name_the_path() {
        let err = read_input(Some(Path::new("/nonexistent/snapshot.json"))).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/snapshot.json"));
    }
}
