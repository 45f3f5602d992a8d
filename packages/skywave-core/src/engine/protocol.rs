//! Response parsing for the engine's line protocol.
//!
//! Every response ends with a literal `END` line. The sentinel (and blank
//! padding) must be stripped before counting results: a naive line count
//! reports an empty queue as size 1.

use std::collections::HashMap;

use crate::constants::ENGINE_END_SENTINEL;

/// Splits a raw response into its payload lines, dropping the `END`
/// sentinel and blank lines.
#[must_use]
pub fn payload_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim_end)
        .take_while(|line| *line != ENGINE_END_SENTINEL)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses request ids out of a queue listing.
///
/// The engine prints ids whitespace-separated, possibly across lines.
#[must_use]
pub fn parse_rids(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .flat_map(|line| line.split_whitespace())
        .map(str::to_string)
        .collect()
}

/// Parses a metadata block into key/value pairs.
///
/// Lines look like `key="value"`. A source's metadata command may print
/// several historical blocks separated by `--- N ---` markers; the last
/// block is the current one and wins.
#[must_use]
pub fn parse_metadata(lines: &[String]) -> HashMap<String, String> {
    let mut current = HashMap::new();
    for line in lines {
        if line.starts_with("---") {
            // New block: the previous one is history.
            current.clear();
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            current.insert(key.trim().to_string(), value.to_string());
        }
    }
    current
}
