//! Header normalisation and the bilingual synonym lexicon.
//!
//! ## Why normalise before matching?
//!
//! Roster headers come out of OCR in many spellings of the same word:
//! `ת.ז`, `ת״ז`, `ת. ז` and `תז` are all "ID number"; `First Name`,
//! `first name:` and `FIRST\nNAME` are all the same column. Rather than list
//! every spelling, both headers and synonyms go through the same
//! [`normalize_header`] function and are compared in normal form.
//!
//! ## Matching order
//!
//! 1. Exact match of the normalised header against a normalised synonym.
//! 2. Whole-word containment: the synonym appears in the header as a run of
//!    complete words. The longest contained synonym wins, so
//!    `"שם משפחה של התלמיד"` is LastName (via `שם משפחה`) rather than
//!    FirstName (via `שם`). Equal lengths fall back to role order
//!    (Identifier, FirstName, LastName, Other).

use crate::error::RollcallError;
use crate::model::ColumnRole;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ── Normalisation ────────────────────────────────────────────────────────

static RE_SELECTION_MARKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i):(?:un)?selected:").unwrap());

static RE_WORD_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\r\n\t/\\_\-\u{05BE}]+").unwrap());

static RE_PUNCT_SYMBOLS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{P}\p{S}]").unwrap());

/// Canonical comparison form of a header or synonym.
///
/// Drops OCR checkbox marks, turns line breaks and slash/dash/underscore
/// separators into spaces, strips remaining punctuation and symbols,
/// lowercases, and collapses whitespace. Hebrew letters pass through
/// unchanged. Idempotent.
pub fn normalize_header(raw: &str) -> String {
    let s = RE_SELECTION_MARKS.replace_all(raw, " ");
    let s = RE_WORD_SEPARATORS.replace_all(&s, " ");
    let s = RE_PUNCT_SYMBOLS.replace_all(&s, "");
    s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

// ── Lexicon ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct Synonym {
    role: ColumnRole,
    normalized: String,
}

/// Role → synonyms mapping used to recognise header cells.
///
/// Serialises as `{"Identifier": [...], "FirstName": [...], ...}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<ColumnRole, Vec<String>>", into = "BTreeMap<ColumnRole, Vec<String>>")]
pub struct Lexicon {
    synonyms: Vec<Synonym>,
}

impl Lexicon {
    /// A lexicon with no synonyms.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in Hebrew/English roster vocabulary.
    pub fn bilingual() -> Self {
        Self::empty()
            .with(
                ColumnRole::Identifier,
                &[
                    "ID",
                    "I.D.",
                    "ID Number",
                    "Identifier",
                    "National ID",
                    "Student ID",
                    "Passport",
                    "Passport/ ID",
                    "Passport Number",
                    "תז",
                    "ת.ז",
                    "ת.ז.",
                    "ת״ז",
                    "ת\"ז",
                    "ת. ז",
                    "מספר ת.ז",
                    "מספר זהות",
                    "תעודת זהות",
                    "מספר תעודת זהות",
                    "דרכון",
                    "מספר דרכון",
                ],
            )
            .with(
                ColumnRole::FirstName,
                &[
                    "First Name",
                    "First",
                    "Given Name",
                    "Name",
                    "Full Name",
                    "Student Name",
                    "שם פרטי",
                    "פרטי",
                    "שם",
                    "שם מלא",
                    "שם התלמיד",
                ],
            )
            .with(
                ColumnRole::LastName,
                &[
                    "Last Name",
                    "Last",
                    "Surname",
                    "Family Name",
                    "שם משפחה",
                    "משפחה",
                ],
            )
            .with(
                ColumnRole::Other,
                &[
                    "Signature",
                    "Sign",
                    "חתימה",
                    "Title",
                    "Position",
                    "Role",
                    "תפקיד",
                    "DOB",
                    "Date of Birth",
                    "Birth Date",
                    "תאריך לידה",
                    "Date",
                    "תאריך",
                    "Nationality",
                    "לאום",
                    "אזרחות",
                    "Phone",
                    "Phone Number",
                    "Mobile",
                    "Tel",
                    "טלפון",
                    "נייד",
                    "Email",
                    "דואל",
                    "Address",
                    "כתובת",
                    "Employee Number",
                    "Employee ID",
                    "מספר עובד",
                    "Quantity",
                    "כמות",
                    "Price",
                    "מחיר",
                    "Total",
                    "סהכ",
                    "Row",
                    "No",
                    "Number",
                    "שורה",
                    "מספר",
                    "מס",
                    "Score",
                    "Grade",
                    "ציון",
                    "Class",
                    "כיתה",
                    "Notes",
                    "הערות",
                ],
            )
    }

    /// Add one synonym. Empty (after normalisation) and duplicate synonyms
    /// are ignored; the first role registered for a spelling keeps it.
    pub fn add(&mut self, role: ColumnRole, synonym: &str) -> &mut Self {
        let normalized = normalize_header(synonym);
        if !normalized.is_empty() && !self.synonyms.iter().any(|s| s.normalized == normalized) {
            self.synonyms.push(Synonym { role, normalized });
        }
        self
    }

    /// Builder-style [`Lexicon::add`] for a list of synonyms.
    pub fn with(mut self, role: ColumnRole, synonyms: &[&str]) -> Self {
        for s in synonyms {
            self.add(role, s);
        }
        self
    }

    /// Add every synonym of `other` that this lexicon does not know yet.
    pub fn extend(&mut self, other: &Lexicon) {
        for s in &other.synonyms {
            self.add(s.role, &s.normalized);
        }
    }

    pub fn len(&self) -> usize {
        self.synonyms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.synonyms.is_empty()
    }

    /// Normalised synonyms registered for `role`.
    pub fn synonyms(&self, role: ColumnRole) -> impl Iterator<Item = &str> {
        self.synonyms
            .iter()
            .filter(move |s| s.role == role)
            .map(|s| s.normalized.as_str())
    }

    /// Role of a raw header cell, if any synonym matches.
    pub fn lookup(&self, header: &str) -> Option<ColumnRole> {
        self.lookup_normalized(&normalize_header(header))
    }

    /// Role of an already-normalised header.
    pub fn lookup_normalized(&self, header: &str) -> Option<ColumnRole> {
        if header.is_empty() {
            return None;
        }
        if let Some(s) = self.synonyms.iter().find(|s| s.normalized == header) {
            return Some(s.role);
        }
        let padded = format!(" {header} ");
        self.synonyms
            .iter()
            .filter(|s| padded.contains(&format!(" {} ", s.normalized)))
            .max_by(|a, b| {
                let (la, lb) = (a.normalized.chars().count(), b.normalized.chars().count());
                la.cmp(&lb).then(b.role.cmp(&a.role))
            })
            .map(|s| s.role)
    }

    /// Role of a raw cell only if it *is* a synonym after normalisation.
    ///
    /// No containment: `"Class 3"` and `"כיתה ג"` are data, not headers.
    pub fn lookup_exact(&self, cell: &str) -> Option<ColumnRole> {
        let normalized = normalize_header(cell);
        self.synonyms
            .iter()
            .find(|s| !normalized.is_empty() && s.normalized == normalized)
            .map(|s| s.role)
    }

    /// `true` if `cell` is exactly a header of any role. Used for
    /// orientation and header-row detection, where containment would count
    /// ordinary data cells.
    pub fn is_header_token(&self, cell: &str) -> bool {
        self.lookup_exact(cell).is_some()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load a lexicon file written by [`Lexicon::to_json`] (or by hand).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RollcallError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| RollcallError::LexiconLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_json(&text).map_err(|e| RollcallError::LexiconLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}

impl From<BTreeMap<ColumnRole, Vec<String>>> for Lexicon {
    fn from(map: BTreeMap<ColumnRole, Vec<String>>) -> Self {
        let mut lexicon = Lexicon::empty();
        for (role, synonyms) in &map {
            for s in synonyms {
                lexicon.add(*role, s);
            }
        }
        lexicon
    }
}

impl From<Lexicon> for BTreeMap<ColumnRole, Vec<String>> {
    fn from(lexicon: Lexicon) -> Self {
        let mut map: BTreeMap<ColumnRole, Vec<String>> = BTreeMap::new();
        for s in lexicon.synonyms {
            map.entry(s.role).or_default().push(s.normalized);
        }
        map
    }
}
