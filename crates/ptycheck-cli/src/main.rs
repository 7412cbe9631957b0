//! ptycheck CLI: behavioral verification for terminal applications.
//!
//! Runs a suite of probes and PTY-driven scenarios against an application and
//! reports a verdict per named test.

// CLI-specific lint allowances (CLI binary, not library)
#![allow(missing_docs)]
#![allow(clippy::print_stdout)] // CLI must print to stdout
#![allow(clippy::print_stderr)] // CLI must print to stderr
#![allow(clippy::exit)] // CLI uses exit codes

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use ptycheck::probe::{probe, validate_json_shape, ProbeOutput, ProbeTarget};
use ptycheck::scenario::ProgressCallback;
use ptycheck::suite::{
    default_suite, run_suite, NoopObserver, SuiteConfig, SuiteOverrides, SuiteRunOptions,
    DEFAULT_PROGRAM,
};
use ptycheck::{HarnessError, HarnessResult};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

mod progress;
mod report;
mod telemetry;

/// Exit code after Ctrl-C.
const EXIT_INTERRUPTED: i32 = 130;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 60_000;

/// Color output mode
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum ColorMode {
    /// Auto-detect based on terminal and `NO_COLOR` env
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Debug, Parser)]
#[command(
    name = "ptycheck",
    version,
    about = "Behavioral verification harness for terminal applications",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    /// Control color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    color: ColorMode,

    #[command(flatten)]
    run: RunArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Flags for running a suite (the default action).
#[derive(Debug, Default, Args)]
struct RunArgs {
    #[arg(long, help = "Suite file (YAML or JSON); defaults to ./ptycheck.yaml or the built-in suite")]
    suite: Option<PathBuf>,
    #[arg(long, help = "Application under test (overrides the suite and PTYCHECK_AUT)")]
    aut: Option<String>,
    #[arg(long, help = "Working directory for the application")]
    cwd: Option<PathBuf>,
    #[arg(long, help = "Run only the named test (repeatable)")]
    only: Vec<String>,
    #[arg(long, help = "Print the full report as JSON instead of streaming results")]
    json: bool,
    #[arg(long, short = 'v', help = "Show step-by-step scenario progress to stderr")]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the application once without a terminal and check its output
    Probe {
        #[arg(long, help = "Application to run (defaults to PTYCHECK_AUT)")]
        aut: Option<String>,
        #[arg(long, help = "Working directory for the application")]
        cwd: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT_MS)]
        timeout_ms: u64,
        #[arg(long = "require-key", help = "Top-level JSON key stdout must contain")]
        require_keys: Vec<String>,
        #[arg(long, help = "Print the captured result as JSON")]
        json: bool,
        /// Arguments passed to the application as-is
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Print the built-in suite as a starting point for a suite file
    DefaultSuite {
        #[arg(long, help = "Output JSON instead of YAML")]
        json: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum, help = "Shell to generate completions for")]
        shell: Shell,
    },
}

/// Configure color output based on CLI flag and environment
fn configure_colors(mode: ColorMode) -> bool {
    let use_color = match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => {
            if std::env::var_os("NO_COLOR").is_some() {
                false
            } else {
                supports_color::on(supports_color::Stream::Stderr).is_some()
            }
        }
    };

    miette::set_hook(Box::new(move |_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .color(use_color)
                .unicode(use_color)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set
    use_color
}

fn main() {
    let cli = Cli::parse();
    let use_color = configure_colors(cli.color);
    telemetry::init_tracing(cli.run.verbose, use_color);

    let result = match cli.command {
        None => cmd_run(cli.run, use_color),
        Some(Commands::Probe {
            aut,
            cwd,
            timeout_ms,
            require_keys,
            json,
            args,
        }) => cmd_probe(aut, cwd, timeout_ms, &require_keys, json, args),
        Some(Commands::DefaultSuite { json }) => cmd_default_suite(json),
        Some(Commands::Completions { shell }) => cmd_completions(shell),
    };

    let code = match result {
        Ok(code) => code,
        Err(err) => {
            let code = err.code.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}

// =============================================================================
// Command Handlers
// =============================================================================

/// Run a suite and report; returns the process exit code.
fn cmd_run(args: RunArgs, use_color: bool) -> HarnessResult<i32> {
    let overrides = SuiteOverrides::from_env().merged(SuiteOverrides {
        program: args.aut,
        cwd: args.cwd,
        only: args.only,
    });
    let config = resolve_suite(args.suite.as_deref(), &overrides)?;

    let cancel = Arc::new(AtomicBool::new(false));
    install_interrupt_handler(&cancel);
    let options = SuiteRunOptions {
        cancel: Some(Arc::clone(&cancel)),
        progress: args.verbose.then(|| {
            Arc::new(progress::VerboseProgress::new(use_color)) as Arc<dyn ProgressCallback>
        }),
    };

    let report = if args.json {
        let report = run_suite(&config, &options, &NoopObserver);
        report::print_json(&report)?;
        report
    } else {
        let reporter = report::StreamingReporter::new(use_color);
        let report = run_suite(&config, &options, &reporter);
        reporter.print_summary(&report);
        report
    };

    if report.interrupted || cancel.load(Ordering::SeqCst) {
        return Ok(EXIT_INTERRUPTED);
    }
    Ok(report.exit_code)
}

/// Suite file from `--suite`, else `./ptycheck.{yaml,yml,json}`, else the built-in suite.
fn resolve_suite(path: Option<&Path>, overrides: &SuiteOverrides) -> HarnessResult<SuiteConfig> {
    let discovered = match path {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::current_dir()
            .ok()
            .and_then(|dir| SuiteConfig::discover(&dir)),
    };
    let mut config = match discovered {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading suite");
            SuiteConfig::load(&path)?
        }
        None => default_suite(),
    };
    config.apply_overrides(overrides)?;
    config.validate()?;
    Ok(config)
}

fn install_interrupt_handler(cancel: &Arc<AtomicBool>) {
    let flag = Arc::clone(cancel);
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        tracing::warn!(error = %err, "could not install Ctrl-C handler");
    }
}

/// Captured probe plus the shape check, for `probe --json`.
#[derive(Serialize)]
struct ProbeReport<'a> {
    #[serde(flatten)]
    output: &'a ProbeOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    shape_error: Option<ptycheck::ErrorInfo>,
}

fn cmd_probe(
    aut: Option<String>,
    cwd: Option<PathBuf>,
    timeout_ms: u64,
    require_keys: &[String],
    json: bool,
    args: Vec<String>,
) -> HarnessResult<i32> {
    let overrides = SuiteOverrides::from_env().merged(SuiteOverrides {
        program: aut,
        cwd,
        only: Vec::new(),
    });
    let target = ProbeTarget {
        cwd: overrides.cwd,
        ..ProbeTarget::new(overrides.program.unwrap_or_else(|| DEFAULT_PROGRAM.to_string()))
    };
    let output = probe(&target, &args, Duration::from_millis(timeout_ms))?;
    let shape = if require_keys.is_empty() {
        Ok(())
    } else {
        validate_json_shape(&output.stdout, require_keys).map(|_| ())
    };

    if json {
        let payload = ProbeReport {
            output: &output,
            shape_error: shape.as_ref().err().map(HarnessError::to_error_info),
        };
        let payload = serde_json::to_string_pretty(&payload)
            .map_err(|err| HarnessError::internal(format!("failed to serialize probe: {err}")))?;
        println!("{payload}");
    } else {
        print!("{}", output.stdout);
        eprint!("{}", output.stderr);
    }

    shape?;
    Ok(if output.success() { 0 } else { 1 })
}

fn cmd_default_suite(json: bool) -> HarnessResult<i32> {
    let suite = default_suite();
    let text = if json {
        suite.to_json()?
    } else {
        suite.to_yaml()?
    };
    println!("{}", text.trim_end());
    Ok(0)
}

#[allow(clippy::unnecessary_wraps)]
fn cmd_completions(shell: Shell) -> HarnessResult<i32> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "ptycheck", &mut std::io::stdout());
    Ok(0)
}
