//! Pager-prompt detection ("--More--", "(A)bort, (CR) continue", ...).
//!
//! BBS software commonly pauses output behind a one-line prompt waiting for
//! a keypress. The engine watches both the line just received and a rolling
//! tail of recent RX text, since some prompts are split across writes.

use std::sync::LazyLock;

use regex::Regex;

/// How many trailing characters of RX text are kept for multi-line prompts.
pub const TAIL_MAX: usize = 512;

static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is).*<\s*CR\s*>.*continue.*",
        r"(?is).*press.*<\s*CR\s*>.*continue.*",
        r"(?is).*<\s*A\s*>.*abort.*<\s*CR\s*>.*continue.*",
        r"(?is).*\(A\)bort.*\(CR\).*continue.*",
        r"(?i)^.*more\s*\(y/n\).*$",
        r"(?i)^.*--more--.*$",
        r"(?i)^.*press any key.*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("pager pattern is valid"))
    .collect()
});

/// Rolling window of recently received text, used to catch prompts that
/// span more than one read or line.
#[derive(Debug, Default)]
pub struct TailWindow {
    buf: String,
}

impl TailWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly received text, keeping only the last [`TAIL_MAX`] chars.
    pub fn push(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        self.buf.push_str(s);
        if self.buf.len() > TAIL_MAX {
            let cut = self.buf.len() - TAIL_MAX;
            // Don't split a UTF-8 boundary; walk forward to the next char start.
            let cut = (cut..self.buf.len())
                .find(|&i| self.buf.is_char_boundary(i))
                .unwrap_or(self.buf.len());
            self.buf.drain(..cut);
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

/// Cheap substring pre-check before running the full pattern set over the
/// tail window, since the tail is checked on every received line.
fn tail_looks_promising(tail_lower: &str) -> bool {
    (tail_lower.contains("abort") && tail_lower.contains("continue"))
        || (tail_lower.contains("press") && tail_lower.contains("continue"))
        || tail_lower.contains("more")
}

/// Test whether `line` (the text just received) or `tail` (the rolling
/// window including it) looks like a pager "press a key to continue" prompt.
pub fn detect(line: &str, tail: &TailWindow) -> bool {
    let line = line.trim();
    if !line.is_empty() && PATTERNS.iter().any(|p| p.is_match(line)) {
        return true;
    }

    let tail = tail.as_str().trim();
    if tail.is_empty() {
        return false;
    }
    if !tail_looks_promising(&tail.to_lowercase()) {
        return false;
    }
    PATTERNS.iter().any(|p| p.is_match(tail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_more_banner() {
        let tail = TailWindow::new();
        assert!(detect("--More--", &tail));
    }

    #[test]
    fn detects_abort_continue_variant() {
        let tail = TailWindow::new();
        assert!(detect("<A>bort, <CR> to Continue", &tail));
    }

    #[test]
    fn detects_press_any_key() {
        let tail = TailWindow::new();
        assert!(detect("Press any key to continue...", &tail));
    }

    #[test]
    fn ignores_ordinary_text() {
        let tail = TailWindow::new();
        assert!(!detect("Welcome to the BBS!", &tail));
    }

    #[test]
    fn catches_prompt_split_across_writes() {
        let mut tail = TailWindow::new();
        tail.push("Type (A)bort, ");
        tail.push("(CR) to Continue");
        assert!(detect("", &tail));
    }

    #[test]
    fn tail_window_is_bounded() {
        let mut tail = TailWindow::new();
        for _ in 0..20 {
            tail.push(&"x".repeat(100));
        }
        assert!(tail.as_str().len() <= TAIL_MAX);
    }
}
