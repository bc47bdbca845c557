//! Black-box redaction analyser
//!
//! Reports text hidden under black rectangles and, with `--remove`, writes
//! a copy of the document with the rectangles taken out.

use anyhow::Context;
use clap::Parser;
use redaction_core::{
    analyze, default_output_path, removal_summary, remove_redactions, render_text, Config,
    FileSource,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const PROGRAM: &str = "unredact";

#[derive(Parser, Debug)]
#[command(name = PROGRAM)]
#[command(
    version,
    about = "Analyze a PDF for black-box redactions and optionally remove them"
)]
struct Args {
    /// Path to the PDF file
    pdf: PathBuf,

    /// Remove black-box redactions (writes a new PDF, keeps underlying text)
    #[arg(long)]
    remove: bool,

    /// Output path for --remove (default: <input>_unredacted.pdf)
    #[arg(short, long, requires = "remove")]
    output: Option<PathBuf>,

    /// Print the report or removal outcome as JSON
    #[arg(long)]
    json: bool,

    /// TOML file with [detection] and [removal] settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum per-channel colour value treated as black
    #[arg(long)]
    tolerance: Option<f32>,

    /// Minimum rectangle width and height, exclusive
    #[arg(long)]
    min_size: Option<f64>,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // stdout carries the report, so logs go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(tolerance) = args.tolerance {
        config.detection.black_tolerance = tolerance;
    }
    if let Some(min_size) = args.min_size {
        config.detection.min_rect_size = min_size;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> anyhow::Result<()> {
    // a missing input fails before anything else is read
    let source = FileSource::new(&args.pdf)?;
    let config = load_config(args)?;

    if args.remove {
        let output = args
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&args.pdf));
        let outcome = remove_redactions(&source, &output, &config)?;
        for warning in &outcome.warnings {
            eprintln!("{}", warning);
        }
        if args.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("serialising outcome")?
            );
        } else {
            println!("{}", removal_summary(&outcome));
        }
        return Ok(());
    }

    let report = analyze(&source, &config)?;
    for warning in &report.warnings {
        eprintln!("{}", warning);
    }
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialising report")?
        );
    } else {
        print!("{}", render_text(&report, PROGRAM));
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);
    tracing::debug!(?args, "starting");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redaction_core::RedactError;
    use std::fs;

    #[test]
    fn test_output_requires_remove() {
        assert!(Args::try_parse_from(["unredact", "a.pdf", "-o", "b.pdf"]).is_err());
        let args = Args::try_parse_from(["unredact", "a.pdf", "--remove", "-o", "b.pdf"]).unwrap();
        assert!(args.remove);
        assert_eq!(args.output, Some(PathBuf::from("b.pdf")));
    }

    #[test]
    fn test_overrides_beat_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("redact.toml");
        fs::write(&path, "[detection]\nblack_tolerance = 0.2\nmin_rect_size = 8.0\n").unwrap();
        let config_arg = path.to_string_lossy().into_owned();

        let args = Args::try_parse_from([
            "unredact",
            "a.pdf",
            "--config",
            config_arg.as_str(),
            "--min-size",
            "5",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.detection.black_tolerance, 0.2);
        assert_eq!(config.detection.min_rect_size, 5.0);
    }

    #[test]
    fn test_invalid_tolerance_is_rejected() {
        let args = Args::try_parse_from(["unredact", "a.pdf", "--tolerance", "1.5"]).unwrap();
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_missing_input_fails_first() {
        let args = Args::try_parse_from([
            "unredact",
            "/definitely/not/here.pdf",
            "--config",
            "/also/missing.toml",
        ])
        .unwrap();
        let err = run(&args).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RedactError>(),
            Some(RedactError::InputNotFound(_))
        ));
    }
}
