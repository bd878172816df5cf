//! Interpretation of the SSH "original command".
//!
//! The SSH daemon runs the gateway as a forced command and exposes what the
//! client actually asked for (e.g. `scp -t /` or `scp -f <token>`). Only the
//! short flags and, for downloads, the last word matter.

use std::collections::BTreeSet;

use tracing::warn;

/// Flag requesting the receiving end (`scp -t`, upload to us).
pub const FLAG_TO: char = 't';

/// Flag requesting the sending end (`scp -f`, download from us).
pub const FLAG_FROM: char = 'f';

/// Parsed original command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalCommand {
    raw: String,
    words: Vec<String>,
    flags: BTreeSet<char>,
}

impl OriginalCommand {
    /// Parse a command string using POSIX shell quoting rules.
    ///
    /// An unparseable command yields no words and no flags.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let words = match shlex::split(&raw) {
            Some(words) => words,
            None => {
                warn!(command = %raw, "failed to parse original command");
                Vec::new()
            }
        };
        let flags = extract_flags(&words);
        Self { raw, words, flags }
    }

    /// The command as received (trimmed).
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Whether a short flag was present, alone or combined (`-vt`).
    pub fn has_flag(&self, flag: char) -> bool {
        self.flags.contains(&flag)
    }

    /// All short flags, sorted, or `-` when there are none.
    pub fn flags_display(&self) -> String {
        if self.flags.is_empty() {
            "-".to_string()
        } else {
            self.flags.iter().collect()
        }
    }

    /// Token argument of a download command: the last word of `scp -f <token>`.
    ///
    /// Requires at least three words.
    pub fn download_token(&self) -> Option<&str> {
        if self.words.len() < 3 {
            return None;
        }
        self.words
            .last()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
    }
}

fn extract_flags(words: &[String]) -> BTreeSet<char> {
    words
        .iter()
        .filter(|w| w.starts_with('-') && !w.starts_with("--") && w.len() > 1)
        .flat_map(|w| w.chars().skip(1))
        .collect()
}
