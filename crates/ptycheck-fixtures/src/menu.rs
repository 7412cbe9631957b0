//! State machine and rendering for the full-screen menu fixture.
//!
//! Startup shows a scan, then a welcome screen. Enter opens the main menu,
//! arrows move, Enter opens an entry and Escape backs out one level. Escape on
//! the welcome screen quits.

use crossterm::event::KeyCode;
use ratatui::backend::TestBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, Paragraph};
use ratatui::{Frame, Terminal};
use std::io;
use std::time::Duration;

/// Simulated scan length in milliseconds.
pub const ENV_SCAN_MS: &str = "PTYCHECK_MENU_SCAN_MS";
/// Panic when opening the main-menu entry whose name contains this text.
pub const ENV_PANIC_ON: &str = "PTYCHECK_MENU_PANIC_ON";
/// Delay before `--cli` commands answer, in milliseconds.
pub const ENV_CLI_SLEEP_MS: &str = "PTYCHECK_MENU_CLI_SLEEP_MS";
/// Make every `--cli sync` import fail.
pub const ENV_FAIL_SYNC: &str = "PTYCHECK_MENU_FAIL_SYNC";

const DEFAULT_SCAN_MS: u64 = 800;

pub const MENU_ENTRIES: [&str; 10] = [
    "Sync Beatmaps",
    "Scan Installations",
    "Collection Sync",
    "Backup",
    "Extract Media",
    "Export Replays",
    "Configuration",
    "Statistics",
    "Restore",
    "Exit",
];

const EXIT_ENTRY: usize = MENU_ENTRIES.len() - 1;

fn entry_options(entry: usize) -> &'static [&'static str] {
    match entry {
        0 => &["Stable to Lazer", "Lazer to Stable", "Bidirectional", "Preview changes"],
        1 => &["Rescan now", "Show paths"],
        2 => &["Merge collections", "Replace collections"],
        3 => &["Back up stable", "Back up lazer", "Back up both", "Open backup folder"],
        4 => &["Extract audio", "Extract backgrounds"],
        5 => &["Export all replays", "Export recent replays"],
        6 => &["Stable path", "Lazer path", "Theme"],
        7 => &["Summary"],
        8 => &["Restore latest backup", "Choose backup"],
        _ => &[],
    }
}

fn entry_name(entry: usize) -> &'static str {
    MENU_ENTRIES.get(entry).copied().unwrap_or("?")
}

/// Environment knobs of the menu app.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuKnobs {
    pub scan: Duration,
    pub panic_on: Option<String>,
    pub cli_sleep: Duration,
    pub fail_sync: bool,
}

impl MenuKnobs {
    pub fn from_env() -> Self {
        let millis = |key: &str, default: u64| {
            std::env::var(key)
                .ok()
                .and_then(|value| value.trim().parse().ok())
                .map_or(Duration::from_millis(default), Duration::from_millis)
        };
        Self {
            scan: millis(ENV_SCAN_MS, DEFAULT_SCAN_MS),
            panic_on: std::env::var(ENV_PANIC_ON)
                .ok()
                .filter(|value| !value.trim().is_empty()),
            cli_sleep: millis(ENV_CLI_SLEEP_MS, 0),
            fail_sync: std::env::var_os(ENV_FAIL_SYNC).is_some(),
        }
    }

    /// Whether opening `entry` should crash the app.
    pub fn panics_on(&self, entry: usize) -> bool {
        self.panic_on.as_ref().is_some_and(|needle| {
            entry_name(entry)
                .to_lowercase()
                .contains(&needle.to_lowercase())
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Screen {
    Scanning,
    Welcome,
    MainMenu,
    Submenu { entry: usize, cursor: usize },
}

/// What the event loop should do after a key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Stay,
    /// Restart the simulated scan.
    Rescan,
    /// A main-menu entry was opened.
    Entered(usize),
    Quit,
}

#[derive(Debug)]
pub struct MenuApp {
    screen: Screen,
    /// Main-menu cursor; kept while a submenu is open.
    cursor: usize,
    after_scan: Screen,
    scans: u32,
    status: Option<String>,
}

impl Default for MenuApp {
    fn default() -> Self {
        Self::new()
    }
}

impl MenuApp {
    pub fn new() -> Self {
        Self {
            screen: Screen::Scanning,
            cursor: 0,
            after_scan: Screen::Welcome,
            scans: 0,
            status: None,
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn scans(&self) -> u32 {
        self.scans
    }

    /// Snake-case name of the current screen.
    pub fn state_name(&self) -> &'static str {
        match self.screen {
            Screen::Scanning => "scanning",
            Screen::Welcome => "welcome",
            Screen::MainMenu => "main_menu",
            Screen::Submenu { .. } => "submenu",
        }
    }

    pub fn finish_scan(&mut self) {
        if self.screen == Screen::Scanning {
            self.screen = self.after_scan;
            self.scans += 1;
            self.status = Some(format!("Scan #{} complete", self.scans));
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Transition {
        match self.screen {
            Screen::Scanning => Transition::Stay,
            Screen::Welcome => match code {
                KeyCode::Enter => {
                    self.screen = Screen::MainMenu;
                    Transition::Stay
                }
                KeyCode::Esc => Transition::Quit,
                _ => Transition::Stay,
            },
            Screen::MainMenu => self.main_menu_key(code),
            Screen::Submenu { entry, cursor } => self.submenu_key(entry, cursor, code),
        }
    }

    fn main_menu_key(&mut self, code: KeyCode) -> Transition {
        match code {
            KeyCode::Up => self.cursor = self.cursor.saturating_sub(1),
            KeyCode::Down => self.cursor = (self.cursor + 1).min(EXIT_ENTRY),
            KeyCode::Enter if self.cursor == EXIT_ENTRY => return Transition::Quit,
            KeyCode::Enter => {
                self.screen = Screen::Submenu {
                    entry: self.cursor,
                    cursor: 0,
                };
                return Transition::Entered(self.cursor);
            }
            KeyCode::Char('r') => {
                self.after_scan = Screen::MainMenu;
                self.screen = Screen::Scanning;
                return Transition::Rescan;
            }
            KeyCode::Esc => self.screen = Screen::Welcome,
            _ => {}
        }
        Transition::Stay
    }

    fn submenu_key(&mut self, entry: usize, cursor: usize, code: KeyCode) -> Transition {
        let options = entry_options(entry);
        match code {
            KeyCode::Up => {
                self.screen = Screen::Submenu {
                    entry,
                    cursor: cursor.saturating_sub(1),
                };
            }
            KeyCode::Down => {
                self.screen = Screen::Submenu {
                    entry,
                    cursor: (cursor + 1).min(options.len().saturating_sub(1)),
                };
            }
            KeyCode::Enter => {
                if let Some(option) = options.get(cursor) {
                    self.status = Some(format!("{}: {option}", entry_name(entry)));
                }
            }
            KeyCode::Esc => self.screen = Screen::MainMenu,
            _ => {}
        }
        Transition::Stay
    }
}

// =============================================================================
// Rendering
// =============================================================================

const HIGHLIGHT: Style = Style::new().fg(Color::Black).bg(Color::Cyan);

/// Draw the whole application into `frame`.
pub fn render(frame: &mut Frame, app: &MenuApp) {
    let [header, body, footer] = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(4),
            Constraint::Length(3),
        ])
        .areas(frame.area());

    let title = Paragraph::new(Line::from(vec![
        Span::styled("osu-sync", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" - beatmap library sync"),
    ]))
    .block(Block::default().borders(Borders::ALL));
    frame.render_widget(title, header);

    match app.screen {
        Screen::Scanning => render_message(
            frame,
            body,
            "Scanning",
            &["Scanning installations..."],
        ),
        Screen::Welcome => render_message(
            frame,
            body,
            "Welcome",
            &["Welcome to osu-sync", "", "Press Enter to continue, Esc to quit"],
        ),
        Screen::MainMenu => render_list(frame, body, "Main Menu", &MENU_ENTRIES, app.cursor),
        Screen::Submenu { entry, cursor } => {
            render_list(frame, body, entry_name(entry), entry_options(entry), cursor);
        }
    }

    let hints = match app.screen {
        Screen::Scanning => "please wait",
        Screen::Welcome => "Enter: menu  Esc: quit",
        Screen::MainMenu => "Up/Down: move  Enter: open  r: rescan  Esc: back",
        Screen::Submenu { .. } => "Up/Down: move  Enter: select  Esc: back",
    };
    let mut spans = vec![Span::styled(hints, Style::default().fg(Color::DarkGray))];
    if let Some(status) = &app.status {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled(status.as_str(), Style::default().fg(Color::Green)));
    }
    let status_line =
        Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    frame.render_widget(status_line, footer);
}

fn render_message(frame: &mut Frame, area: Rect, title: &str, lines: &[&str]) {
    let text: Vec<Line> = lines.iter().map(|line| Line::from(*line)).collect();
    let paragraph = Paragraph::new(text).block(
        Block::default()
            .title(format!(" {title} "))
            .borders(Borders::ALL),
    );
    frame.render_widget(paragraph, area);
}

fn render_list(frame: &mut Frame, area: Rect, title: &str, items: &[&str], cursor: usize) {
    let items: Vec<ListItem> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            if index == cursor {
                ListItem::new(format!("> {item}")).style(HIGHLIGHT)
            } else {
                ListItem::new(format!("  {item}"))
            }
        })
        .collect();
    let list = List::new(items).block(
        Block::default()
            .title(format!(" {title} "))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(list, area);
}

/// Render `app` off-screen and return the text rows, right-trimmed.
pub fn snapshot_lines(app: &MenuApp, width: u16, height: u16) -> io::Result<Vec<String>> {
    let mut terminal = Terminal::new(TestBackend::new(width, height))?;
    terminal.draw(|frame| render(frame, app))?;
    let buffer = terminal.backend().buffer();
    let lines = (0..height)
        .map(|y| {
            let row: String = (0..width)
                .map(|x| buffer.cell((x, y)).map_or(" ", |cell| cell.symbol()))
                .collect();
            row.trim_end().to_string()
        })
        .collect();
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> MenuApp {
        let mut app = MenuApp::new();
        app.finish_scan();
        app
    }

    #[test]
    fn keys_are_ignored_while_scanning() {
        let mut app = MenuApp::new();
        assert_eq!(app.handle_key(KeyCode::Enter), Transition::Stay);
        assert_eq!(app.screen(), Screen::Scanning);
        app.finish_scan();
        assert_eq!(app.screen(), Screen::Welcome);
        assert_eq!(app.scans(), 1);
    }

    #[test]
    fn smoke_walk_returns_to_welcome() {
        let mut app = ready();
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.handle_key(KeyCode::Enter), Transition::Entered(0));
        app.handle_key(KeyCode::Esc);
        assert_eq!(app.screen(), Screen::MainMenu);
        app.handle_key(KeyCode::Esc);
        assert_eq!(app.screen(), Screen::Welcome);
        assert_eq!(app.handle_key(KeyCode::Esc), Transition::Quit);
    }

    #[test]
    fn main_menu_cursor_survives_submenus() {
        let mut app = ready();
        app.handle_key(KeyCode::Enter);
        for _ in 0..3 {
            app.handle_key(KeyCode::Down);
        }
        assert_eq!(app.handle_key(KeyCode::Enter), Transition::Entered(3));
        app.handle_key(KeyCode::Down);
        assert_eq!(app.screen(), Screen::Submenu { entry: 3, cursor: 1 });
        app.handle_key(KeyCode::Esc);
        assert_eq!(app.cursor(), 3);

        for _ in 0..20 {
            app.handle_key(KeyCode::Down);
        }
        assert_eq!(app.cursor(), EXIT_ENTRY);
        assert_eq!(app.handle_key(KeyCode::Enter), Transition::Quit);
    }

    #[test]
    fn rescan_returns_to_main_menu() {
        let mut app = ready();
        app.handle_key(KeyCode::Enter);
        assert_eq!(app.handle_key(KeyCode::Char('r')), Transition::Rescan);
        assert_eq!(app.screen(), Screen::Scanning);
        app.finish_scan();
        assert_eq!(app.screen(), Screen::MainMenu);
        assert_eq!(app.scans(), 2);
    }

    #[test]
    fn panic_knob_matches_entry_names() {
        let knobs = MenuKnobs {
            scan: Duration::ZERO,
            panic_on: Some("backup".to_string()),
            cli_sleep: Duration::ZERO,
            fail_sync: false,
        };
        assert!(knobs.panics_on(3));
        assert!(!knobs.panics_on(0));
    }

    #[test]
    fn snapshot_shows_menu_text() {
        let mut app = ready();
        app.handle_key(KeyCode::Enter);
        let lines = snapshot_lines(&app, 80, 24).unwrap();
        assert_eq!(lines.len(), 24);
        let text = lines.join("\n");
        assert!(text.contains("osu-sync"));
        assert!(text.contains("> Sync Beatmaps"));
        assert!(text.contains("Export Replays"));
        assert_eq!(app.state_name(), "main_menu");
    }
}
