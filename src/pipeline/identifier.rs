//! Identifier shape: does a cell look like an ID or passport number?
//!
//! The shape is a digit run of configurable length, optionally preceded by
//! one prefix letter, optionally with spaces between digit groups. It is
//! compiled once per batch from [`Heuristics`].

use crate::config::Heuristics;
use crate::error::RollcallError;
use regex::Regex;

/// Compiled identifier-shape matcher.
#[derive(Debug, Clone)]
pub struct IdentifierShape {
    pattern: Regex,
    allow_spaces: bool,
}

impl IdentifierShape {
    pub fn new(heuristics: &Heuristics) -> Result<Self, RollcallError> {
        let prefix = if heuristics.identifier_prefixes.is_empty() {
            String::new()
        } else {
            let class: String = heuristics
                .identifier_prefixes
                .iter()
                .map(|c| regex::escape(&c.to_string()))
                .collect();
            format!("(?i:[{class}])?")
        };
        let source = format!(
            r"^{prefix}\d{{{},{}}}$",
            heuristics.identifier_min_digits, heuristics.identifier_max_digits
        );
        let pattern = Regex::new(&source).map_err(|e| {
            RollcallError::InvalidConfig(format!("identifier pattern '{source}': {e}"))
        })?;
        Ok(Self {
            pattern,
            allow_spaces: heuristics.identifier_allow_spaces,
        })
    }

    /// `true` if `cell`, trimmed, is identifier-shaped.
    pub fn matches(&self, cell: &str) -> bool {
        let cell = cell.trim();
        if cell.is_empty() {
            return false;
        }
        if self.allow_spaces && cell.contains(char::is_whitespace) {
            let compact: String = cell.chars().filter(|c| !c.is_whitespace()).collect();
            self.pattern.is_match(&compact)
        } else {
            self.pattern.is_match(cell)
        }
    }
}
