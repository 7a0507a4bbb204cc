// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fuzzy message dedup: messages differing only in identifiers collapse to
//! one pattern. UUIDs, hex addresses, and runs of digits are replaced before
//! comparison.

use regex::Regex;

fn uuid_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .unwrap()
    })
}

fn hex_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"0x[0-9a-fA-F]+").unwrap()
    })
}

fn digits_regex() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
        Regex::new(r"\d+").unwrap()
    })
}

/// Collapse identifiers so repeated messages compare equal.
pub fn normalize(message: &str) -> String {
    let s = uuid_regex().replace_all(message, "<uuid>");
    let s = hex_regex().replace_all(&s, "<hex>");
    digits_regex().replace_all(&s, "<n>").into_owned()
}

#[cfg(test)]
#[path = "patterns_tests.rs"]
mod tests;
