use crate::model::{EmulatedScreen, TerminalSize};
use vt100::Parser;

/// Terminal emulator wrapper using vt100.
///
/// Fed the same bytes as the session's output buffer; gives a cursor-addressed
/// grid view for assertions that the linearized snapshot cannot express.
pub struct Terminal {
    parser: Parser,
}

impl Terminal {
    /// Create a new terminal with the given size.
    pub fn new(size: TerminalSize) -> Self {
        Self {
            parser: Parser::new(size.rows, size.cols, 0),
        }
    }

    /// Resize the terminal.
    pub fn resize(&mut self, size: TerminalSize) {
        self.parser.set_size(size.rows, size.cols);
    }

    /// Process incoming bytes.
    pub fn process_bytes(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
    }

    /// Capture the current grid.
    pub fn screen(&self) -> EmulatedScreen {
        let screen = self.parser.screen();
        let (rows, cols) = screen.size();
        let (cursor_row, cursor_col) = screen.cursor_position();
        EmulatedScreen {
            rows,
            cols,
            cursor_row,
            cursor_col,
            cursor_visible: !screen.hide_cursor(),
            alternate_screen: screen.alternate_screen(),
            lines: screen
                .rows(0, cols)
                .map(|row| row.trim_end().to_string())
                .collect(),
        }
    }
}
