//! Plain-text view of a shell's output.
//!
//! Not a terminal emulator: `vte` parses the stream, printable text and
//! line controls fill a scrollback, and OSC 0/2 titles are collected. All
//! other sequences are dropped.

use std::collections::VecDeque;

use vte::{Parser, Perform};

/// Lines kept per tab.
const SCROLLBACK: usize = 2000;

struct Scrollback {
    lines: VecDeque<String>,
    titles: Vec<String>,
}

impl Scrollback {
    fn current(&mut self) -> &mut String {
        if self.lines.is_empty() {
            self.lines.push_back(String::new());
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }

    fn newline(&mut self) {
        self.lines.push_back(String::new());
        if self.lines.len() > SCROLLBACK {
            self.lines.pop_front();
        }
    }
}

impl Perform for Scrollback {
    fn print(&mut self, c: char) {
        self.current().push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.newline(),
            b'\t' => self.current().push('\t'),
            0x08 => {
                self.current().pop();
            }
            _ => {}
        }
    }

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        let [kind, title @ ..] = params else {
            return;
        };
        if matches!(*kind, b"0" | b"2") && !title.is_empty() {
            let title = title.join(&b';');
            self.titles.push(String::from_utf8_lossy(&title).into_owned());
        }
    }
}

pub struct Screen {
    parser: Parser,
    scrollback: Scrollback,
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            scrollback: Scrollback {
                lines: VecDeque::from([String::new()]),
                titles: Vec::new(),
            },
        }
    }

    /// Append output. Returns any titles the output set.
    pub fn feed(&mut self, text: &str) -> Vec<String> {
        self.parser.advance(&mut self.scrollback, text.as_bytes());
        std::mem::take(&mut self.scrollback.titles)
    }

    /// The last `n` lines.
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<String> {
        let lines = &self.scrollback.lines;
        lines
            .iter()
            .skip(lines.len().saturating_sub(n))
            .cloned()
            .collect()
    }
}
