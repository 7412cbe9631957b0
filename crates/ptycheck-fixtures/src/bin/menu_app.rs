//! Fixture: full-screen beatmap-sync menu app with a scriptable CLI.
//!
//! Interactive by default. `--cli scan|dry-run|sync` answers with canned JSON
//! and `--tui-snapshot` prints one rendered frame. Behavior is tuned through
//! the `PTYCHECK_MENU_*` environment variables.

// Test fixtures require special allowances - they are not production code
#![allow(clippy::print_stdout)] // Fixture output goes to stdout
#![allow(clippy::print_stderr)]
#![allow(clippy::panic)] // Crash injection via PTYCHECK_MENU_PANIC_ON

use clap::{Parser, Subcommand};
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ptycheck_fixtures::catalog::{self, Direction};
use ptycheck_fixtures::menu::{self, MenuApp, MenuKnobs, Transition};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::Terminal;
use serde_json::{json, Value};
use std::io;
use std::process::ExitCode;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const POLL: Duration = Duration::from_millis(50);
const SNAPSHOT_WIDTH: u16 = 80;
const SNAPSHOT_HEIGHT: u16 = 24;

#[derive(Debug, Parser)]
#[command(name = "ptycheck-menu-app", about = "Menu fixture for ptycheck")]
struct Args {
    /// Answer a single command without a terminal
    #[arg(long)]
    cli: bool,
    /// Print one rendered frame of the main menu and exit
    #[arg(long)]
    tui_snapshot: bool,
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Count beatmap sets in both installations
    Scan,
    /// Show what a sync would do
    DryRun {
        #[arg(value_enum)]
        direction: Direction,
    },
    /// Sync the given beatmap sets
    Sync {
        #[arg(value_enum)]
        direction: Direction,
        #[arg(long = "set-ids", value_delimiter = ',', required = true)]
        set_ids: Vec<u64>,
    },
}

fn main() -> io::Result<ExitCode> {
    let args = Args::parse();
    let knobs = MenuKnobs::from_env();

    if args.tui_snapshot {
        print_snapshot(args.json)?;
        return Ok(ExitCode::SUCCESS);
    }
    match (args.cli, args.command) {
        (true, Some(command)) => {
            std::thread::sleep(knobs.cli_sleep);
            print_report(&command_report(&command, &knobs), args.json);
            Ok(ExitCode::SUCCESS)
        }
        (false, Some(_)) | (true, None) => {
            eprintln!("usage: ptycheck-menu-app --cli <scan|dry-run|sync> [--json]");
            Ok(ExitCode::from(2))
        }
        (false, None) => {
            run_interactive(&knobs)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// =============================================================================
// CLI Mode
// =============================================================================

fn command_report(command: &CliCommand, knobs: &MenuKnobs) -> Value {
    match command {
        CliCommand::Scan => catalog::scan_report(),
        CliCommand::DryRun { direction } => catalog::dry_run_report(*direction),
        CliCommand::Sync { direction, set_ids } => {
            catalog::sync_report(*direction, set_ids, knobs.fail_sync)
        }
    }
}

fn print_report(report: &Value, json: bool) {
    if json {
        println!("{report:#}");
        return;
    }
    if let Value::Object(fields) = report {
        for (key, value) in fields {
            match value {
                Value::Array(items) => println!("{key}: {} entries", items.len()),
                other => println!("{key}: {other}"),
            }
        }
    }
}

fn print_snapshot(json: bool) -> io::Result<()> {
    let mut app = MenuApp::new();
    app.finish_scan();
    app.handle_key(crossterm::event::KeyCode::Enter);
    let lines = menu::snapshot_lines(&app, SNAPSHOT_WIDTH, SNAPSHOT_HEIGHT)?;
    if json {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        let snapshot = json!({
            "state": app.state_name(),
            "buffer": lines,
            "width": SNAPSHOT_WIDTH,
            "height": SNAPSHOT_HEIGHT,
            "timestamp": timestamp,
        });
        println!("{snapshot}");
    } else {
        println!("{}", lines.join("\n"));
    }
    Ok(())
}

// =============================================================================
// Interactive Mode
// =============================================================================

fn run_interactive(knobs: &MenuKnobs) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = event_loop(&mut terminal, knobs);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    result
}

fn event_loop<B: Backend>(terminal: &mut Terminal<B>, knobs: &MenuKnobs) -> io::Result<()> {
    let mut app = MenuApp::new();
    let mut scan_until = Some(Instant::now() + knobs.scan);
    loop {
        if scan_until.is_some_and(|deadline| Instant::now() >= deadline) {
            app.finish_scan();
            scan_until = None;
        }
        terminal.draw(|frame| menu::render(frame, &app))?;

        if !event::poll(POLL)? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match app.handle_key(key.code) {
            Transition::Quit => return Ok(()),
            Transition::Rescan => scan_until = Some(Instant::now() + knobs.scan),
            Transition::Entered(entry) if knobs.panics_on(entry) => {
                panic!("injected crash opening menu entry {entry}");
            }
            Transition::Entered(_) | Transition::Stay => {}
        }
    }
}
