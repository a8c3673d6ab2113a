//! The VT/ANSI Terminal Model (§4.2): a grid of interpreted screen state
//! fed by raw PTY output, embedding a real VT parser rather than
//! hand-rolling escape-sequence handling.
//!
//! Grounded on `kild-ui::terminal::state::Terminal`'s use of
//! `alacritty_terminal::Term` + `vte::ansi::Processor`: that file wraps
//! `Term` for a GUI renderer, this one wraps it for headless snapshotting.
//! The listener only needs to capture `PtyWrite` (the model asking to echo
//! bytes back, e.g. in response to a DA/CPR query) since there is no
//! renderer to wake.

use std::collections::VecDeque;

use alacritty_terminal::event::{Event as AlacEvent, EventListener};
use alacritty_terminal::grid::Dimensions;
use alacritty_terminal::index::{Column, Line, Point};
use alacritty_terminal::term::cell::Flags as CellFlags;
use alacritty_terminal::term::{Config as TermConfig, Term, TermMode};
use alacritty_terminal::vte::ansi::Processor;

use super::style::{Style, StyledRun};

/// Satisfies `alacritty_terminal::grid::Dimensions` for a fixed-size,
/// scrollback-less viewport. `total_lines` intentionally matches
/// `screen_lines` — the model keeps the full visible grid but relies on
/// `Term`'s own scrollback history (sized via `TermConfig`) rather than
/// exposing scrollback through this trait.
struct ModelDimensions {
    cols: usize,
    screen_lines: usize,
}

impl Dimensions for ModelDimensions {
    fn total_lines(&self) -> usize {
        self.screen_lines
    }
    fn screen_lines(&self) -> usize {
        self.screen_lines
    }
    fn columns(&self) -> usize {
        self.cols
    }
}

/// Forwards alacritty events the model cares about. `PtyWrite` arises when
/// the parser answers a terminal query (e.g. Device Attributes, Cursor
/// Position Report) with bytes that must be written back to the PTY master
/// as if the "application" had typed them.
#[derive(Clone, Default)]
pub(crate) struct ModelListener {
    pty_writes: std::sync::Arc<std::sync::Mutex<VecDeque<Vec<u8>>>>,
}

impl EventListener for ModelListener {
    fn send_event(&self, event: AlacEvent) {
        if let AlacEvent::PtyWrite(text) = event {
            let mut queue = self
                .pty_writes
                .lock()
                .unwrap_or_else(|poison| poison.into_inner());
            queue.push_back(text.into_bytes());
        }
    }
}

/// A point-in-time rendering of the Terminal Model's grid: plain text and
/// a style-annotated escape sequence covering the same cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Rows joined by `\n`, each padded to the grid width with spaces.
    pub text: String,
    pub(crate) runs: Vec<StyledRun>,
    pub rows: usize,
    pub cols: usize,
}

impl Snapshot {
    /// Re-encode the styled runs as a VT byte sequence: for each run, a
    /// cursor position (CUP), an SGR reset-then-attributes, then the run's
    /// text. Feeding this into a fresh `TerminalModel` of the same
    /// dimensions reproduces the same `text`.
    pub fn styled_seq(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for run in &self.runs {
            out.extend(format!("\x1b[{};{}H", run.row + 1, run.col + 1).into_bytes());
            let params: Vec<String> = run.style.sgr_params().iter().map(u32::to_string).collect();
            out.extend(format!("\x1b[{}m", params.join(";")).into_bytes());
            out.extend(run.text.as_bytes());
        }
        out.extend(b"\x1b[0m");
        out
    }
}

/// Owns the VT parser state and the grid it produces. Not `Send`-shared
/// directly; the Session Broker owns one per session and mutates it only
/// from its own task.
pub struct TerminalModel {
    term: Term<ModelListener>,
    processor: Processor,
    listener: ModelListener,
    cols: usize,
    rows: usize,
}

impl TerminalModel {
    /// `scrollback_lines` bounds the off-screen history `Term` retains;
    /// the Session Broker derives it from `EngineConfig::scrollback_cap_bytes`
    /// using the same 1 MiB default the spec resolves Open Question 1 to.
    pub fn new(cols: u16, rows: u16, scrollback_lines: usize) -> Self {
        let listener = ModelListener::default();
        let mut config = TermConfig::default();
        config.scrolling_history = scrollback_lines;
        let dims = ModelDimensions {
            cols: cols as usize,
            screen_lines: rows as usize,
        };
        let term = Term::new(config, &dims, listener.clone());
        Self {
            term,
            processor: Processor::new(),
            listener,
            cols: cols as usize,
            rows: rows as usize,
        }
    }

    /// Feed raw PTY output through the VT parser, mutating the grid.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.processor.advance(&mut self.term, bytes);
    }

    /// Drain bytes the parser wants echoed back to the PTY (query
    /// responses). Must be polled after every `feed` call.
    pub fn take_pty_writes(&mut self) -> Vec<Vec<u8>> {
        let mut queue = self
            .listener
            .pty_writes
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        queue.drain(..).collect()
    }

    /// Resize the grid, reflowing existing content the way `Term::resize`
    /// does. A no-op in terms of grid content when `cols`/`rows` are
    /// unchanged, but callers still emit a Resize event per Open Question 2.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols as usize;
        self.rows = rows as usize;
        self.term.resize(ModelDimensions {
            cols: self.cols,
            screen_lines: self.rows,
        });
    }

    /// Cursor position as `(row, col, visible)`, zero-indexed from the
    /// viewport's top-left.
    pub fn cursor(&self) -> (usize, usize, bool) {
        let point = self.term.grid().cursor.point;
        let visible = self.term.mode().contains(TermMode::SHOW_CURSOR);
        (point.line.0.max(0) as usize, point.column.0, visible)
    }

    /// Render the current viewport as plain text and as style-annotated
    /// runs (§4.2's Snapshot invariants: full-width glyphs occupy two
    /// cells, continuation cells are skipped when building text).
    pub fn snapshot(&self) -> Snapshot {
        let grid = self.term.grid();
        let mut lines: Vec<String> = Vec::with_capacity(self.rows);
        let mut runs: Vec<StyledRun> = Vec::new();

        for row in 0..self.rows {
            let line = Line(row as i32);
            let mut text = String::with_capacity(self.cols);
            let mut run_start: Option<(usize, Style)> = None;
            let mut run_text = String::new();

            for col in 0..self.cols {
                let point = Point::new(line, Column(col));
                let cell = &grid[point];

                if cell.flags.contains(CellFlags::WIDE_CHAR_SPACER) {
                    continue;
                }

                text.push(cell.c);

                let style = Style::from_flags(cell.fg, cell.bg, cell.flags);
                match &run_start {
                    Some((_, current)) if *current == style => {
                        run_text.push(cell.c);
                    }
                    _ => {
                        if let Some((start_col, style)) = run_start.take() {
                            runs.push(StyledRun {
                                row,
                                col: start_col,
                                text: std::mem::take(&mut run_text),
                                style,
                            });
                        }
                        run_start = Some((col, style));
                        run_text.push(cell.c);
                    }
                }
            }

            if let Some((start_col, style)) = run_start.take() {
                runs.push(StyledRun {
                    row,
                    col: start_col,
                    text: run_text,
                    style,
                });
            }

            lines.push(text);
        }

        Snapshot {
            text: lines.join("\n"),
            runs,
            rows: self.rows,
            cols: self.cols,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_feed_is_visible_in_snapshot() {
        let mut model = TerminalModel::new(10, 2, 1024);
        model.feed(b"hi");
        let snap = model.snapshot();
        assert!(snap.text.starts_with("hi"));
    }

    #[test]
    fn carriage_return_line_feed_advances_rows() {
        let mut model = TerminalModel::new(10, 3, 1024);
        model.feed(b"a\r\nb\r\nc");
        let snap = model.snapshot();
        let lines: Vec<&str> = snap.text.split('\n').collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('a'));
        assert!(lines[1].starts_with('b'));
        assert!(lines[2].starts_with('c'));
    }

    #[test]
    fn resize_changes_reported_dimensions() {
        let mut model = TerminalModel::new(80, 24, 1024);
        model.resize(40, 12);
        let snap = model.snapshot();
        assert_eq!(snap.cols, 40);
        assert_eq!(snap.rows, 12);
    }

    #[test]
    fn no_op_resize_is_a_content_preserving_noop() {
        let mut model = TerminalModel::new(10, 2, 1024);
        model.feed(b"hi");
        let before = model.snapshot();
        model.resize(10, 2);
        let after = model.snapshot();
        assert_eq!(before.text, after.text);
    }

    #[test]
    fn sgr_bold_produces_a_distinct_styled_run() {
        let mut model = TerminalModel::new(10, 1, 1024);
        model.feed(b"\x1b[1mhi\x1b[0mplain");
        let snap = model.snapshot();
        assert!(snap.runs.iter().any(|r| r.style.bold && r.text == "hi"));
        assert!(snap
            .runs
            .iter()
            .any(|r| !r.style.bold && r.text.starts_with("plain")));
    }

    #[test]
    fn styled_seq_roundtrips_text_through_a_fresh_model() {
        let mut model = TerminalModel::new(10, 2, 1024);
        model.feed(b"\x1b[1;31mhi\x1b[0m\r\nthere");
        let snap = model.snapshot();

        let mut replay = TerminalModel::new(10, 2, 1024);
        replay.feed(&snap.styled_seq());
        let replayed = replay.snapshot();

        assert_eq!(replayed.text, snap.text);
    }

    #[test]
    fn cursor_starts_at_origin_and_is_visible() {
        let model = TerminalModel::new(10, 2, 1024);
        let (row, col, visible) = model.cursor();
        assert_eq!((row, col), (0, 0));
        assert!(visible);
    }

    #[test]
    fn cursor_advances_after_feed() {
        let mut model = TerminalModel::new(10, 2, 1024);
        model.feed(b"abc");
        let (row, col, _) = model.cursor();
        assert_eq!((row, col), (0, 3));
    }

    #[test]
    fn decctem_hide_cursor_is_reflected() {
        let mut model = TerminalModel::new(10, 2, 1024);
        model.feed(b"\x1b[?25l");
        let (_, _, visible) = model.cursor();
        assert!(!visible);
    }

    #[test]
    fn pty_writes_drain_is_empty_for_plain_output() {
        let mut model = TerminalModel::new(10, 2, 1024);
        model.feed(b"hello");
        assert!(model.take_pty_writes().is_empty());
    }
}
