//! Terminal emulator adapter: feeds raw PTY bytes through a VT100
//! parser and produces the full-screen text snapshot the marker parser
//! marker and noise filters operate on.

use std::collections::VecDeque;

const SCROLLBACK_CAP: usize = 5000;

pub struct TermScreen {
    parser: vt100::Parser,
    scrollback: VecDeque<String>,
    last_contents: String,
}

impl TermScreen {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self {
            parser: vt100::Parser::new(rows, cols, SCROLLBACK_CAP),
            scrollback: VecDeque::with_capacity(SCROLLBACK_CAP),
            last_contents: String::new(),
        }
    }

    pub fn process(&mut self, bytes: &[u8]) {
        self.parser.process(bytes);
        self.reconcile_scrollback();
    }

    pub fn resize(&mut self, rows: u16, cols: u16) {
        self.parser.set_size(rows, cols);
    }

    /// Current visible screen as plain text, one line per row.
    pub fn visible_text(&self) -> String {
        self.parser.screen().contents()
    }

    /// Visible screen plus retained scrollback, oldest first — this is
    /// the "full snapshot" the marker parser expects.
    pub fn full_snapshot(&self) -> String {
        if self.scrollback.is_empty() {
            return self.visible_text();
        }
        let mut out = String::new();
        for line in &self.scrollback {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&self.visible_text());
        out
    }

    /// When the visible screen's top line changes from what we saw last,
    /// the evicted line is captured into our own scrollback buffer — vt100
    /// keeps its own internal scrollback but doesn't expose line-level
    /// eviction events, so we diff against the previous contents snapshot.
    fn reconcile_scrollback(&mut self) {
        let contents = self.visible_text();
        if contents == self.last_contents {
            return;
        }
        let old_lines: Vec<&str> = self.last_contents.lines().collect();
        let new_lines: Vec<&str> = contents.lines().collect();

        if !old_lines.is_empty() && !new_lines.is_empty() && old_lines[0] != new_lines[0] {
            if let Some(pos) = new_lines.iter().position(|l| *l == old_lines[0]) {
                let evicted: Vec<String> = old_lines[..pos.min(old_lines.len())]
                    .iter()
                    .map(|l| l.to_string())
                    .collect();
                for line in evicted {
                    self.push_scrollback(line);
                }
            }
        }
        self.last_contents = contents;
    }

    fn push_scrollback(&mut self, line: String) {
        if self.scrollback.len() >= SCROLLBACK_CAP {
            self.scrollback.pop_front();
        }
        self.scrollback.push_back(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processes_plain_text() {
        let mut screen = TermScreen::new(5, 20);
        screen.process(b"hello world\r\n");
        assert!(screen.visible_text().contains("hello world"));
    }

    #[test]
    fn resize_does_not_panic() {
        let mut screen = TermScreen::new(5, 20);
        screen.process(b"hi\r\n");
        screen.resize(10, 40);
        screen.process(b"more\r\n");
        assert!(screen.visible_text().contains("more"));
    }

    #[test]
    fn full_snapshot_falls_back_to_visible_when_no_scrollback() {
        let mut screen = TermScreen::new(5, 20);
        screen.process(b"only line\r\n");
        assert_eq!(screen.full_snapshot(), screen.visible_text());
    }
}
