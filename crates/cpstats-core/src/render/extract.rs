//! Field extraction from rendered markup.
//!
//! The string helpers are deliberately naive: they match ASCII tag names
//! case-insensitively and never build a DOM. Each field is read through a
//! prioritized chain of [`Extractor`]s; the first one that yields a value
//! wins.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::domain::RawSourceRecord;

/// One heuristic for locating a field in a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// Text between an opening pattern (up to its `>`) and a closing pattern.
    Marker {
        open: &'static str,
        close: &'static str,
    },
    /// First `<tr>` or `<li>` whose visible text starts with the whole word
    /// `label`; the value is the remaining text of that row.
    TableRow { label: &'static str },
    /// Free-text search for `label`, optional `:`/`-`/`#`, then a number.
    Label { label: &'static str },
}

impl Extractor {
    pub fn extract(&self, page: &PageText<'_>) -> Option<String> {
        match *self {
            Self::Marker { open, close } => slice_between_ci(page.html, open, close)
                .map(strip_tags)
                .filter(|text| !text.is_empty()),
            Self::TableRow { label } => table_row_value(page.html, label),
            Self::Label { label } => label_pattern(label)?
                .captures(&page.text)
                .and_then(|captures| captures.get(1))
                .map(|value| value.as_str().to_owned()),
        }
    }
}

static LABEL_PATTERNS: LazyLock<Mutex<HashMap<&'static str, Regex>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Compiled `label` pattern, built once per label for the process.
fn label_pattern(label: &'static str) -> Option<Regex> {
    let mut patterns = LABEL_PATTERNS
        .lock()
        .expect("label pattern lock is not poisoned");
    if let Some(regex) = patterns.get(label) {
        return Some(regex.clone());
    }

    let pattern = format!(r"(?i)\b{}\s*[:\-]?\s*#?\s*(\d[\d,]*)", regex::escape(label));
    match Regex::new(&pattern) {
        Ok(regex) => {
            patterns.insert(label, regex.clone());
            Some(regex)
        }
        Err(error) => {
            warn!(label, %error, "label pattern failed to compile");
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// First integer in the matched text; `0` when nothing matches.
    Number,
    /// First integer in the matched text; omitted when nothing matches.
    OptionalNumber,
    /// Matched text as-is; omitted when nothing matches.
    Text,
}

/// A record field and the extractor chain that fills it.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub chain: &'static [Extractor],
}

impl FieldSpec {
    pub const fn number(name: &'static str, chain: &'static [Extractor]) -> Self {
        Self {
            name,
            kind: FieldKind::Number,
            chain,
        }
    }

    pub const fn optional_number(name: &'static str, chain: &'static [Extractor]) -> Self {
        Self {
            name,
            kind: FieldKind::OptionalNumber,
            chain,
        }
    }

    pub const fn text(name: &'static str, chain: &'static [Extractor]) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            chain,
        }
    }

    fn resolve(&self, page: &PageText<'_>) -> Option<Value> {
        self.chain.iter().find_map(|extractor| {
            let raw = extractor.extract(page)?;
            match self.kind {
                FieldKind::Number | FieldKind::OptionalNumber => first_number(&raw).map(Value::from),
                FieldKind::Text => Some(Value::from(raw)),
            }
        })
    }
}

/// Markup plus its pre-computed visible text.
#[derive(Debug)]
pub struct PageText<'a> {
    pub html: &'a str,
    pub text: String,
}

impl<'a> PageText<'a> {
    pub fn new(html: &'a str) -> Self {
        Self {
            html,
            text: visible_text(html),
        }
    }
}

/// Runs every field chain over `html`.
///
/// Numeric fields nothing matches are reported as `0`; optional numbers and
/// text fields are left out so the normalizer applies its own default.
pub fn extract_fields(html: &str, fields: &[FieldSpec]) -> RawSourceRecord {
    let page = PageText::new(html);
    let mut record = RawSourceRecord::success();
    let mut missing = Vec::new();

    for field in fields {
        match (field.resolve(&page), field.kind) {
            (Some(value), _) => record.insert(field.name, value),
            (None, FieldKind::Number) => {
                missing.push(field.name);
                record.insert(field.name, 0_u64);
            }
            (None, FieldKind::OptionalNumber | FieldKind::Text) => missing.push(field.name),
        }
    }

    if !missing.is_empty() {
        record = record.with_diagnostic(format!("no extractor matched: {}", missing.join(", ")));
    }
    record
}

/// Find the section between an opening pattern and its closing pattern,
/// case-insensitive on ASCII. Returns the markup inside the opening tag.
pub fn slice_between_ci<'a>(s: &'a str, open_pat: &str, close_pat: &str) -> Option<&'a str> {
    let lc = s.to_ascii_lowercase();
    let open_idx = lc.find(&open_pat.to_ascii_lowercase())?;
    let after_open = s[open_idx..].find('>')? + open_idx + 1;
    let close_rel = lc[after_open..].find(&close_pat.to_ascii_lowercase())?;
    Some(&s[after_open..after_open + close_rel])
}

/// Remove all `<...>` tags, decode the common entities and collapse whitespace.
pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for ch in s.chars() {
        match ch {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    normalize_ws(&normalize_entities(&out))
}

pub fn normalize_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&#9733;", "★")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Collapse runs of whitespace into one space and trim.
pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible document text with `<script>` and `<style>` bodies removed.
pub fn visible_text(html: &str) -> String {
    let mut cleaned = html.to_owned();
    for tag in ["script", "style"] {
        cleaned = remove_blocks_ci(&cleaned, &format!("<{tag}"), &format!("</{tag}>"));
    }
    strip_tags(&cleaned)
}

fn remove_blocks_ci(s: &str, open: &str, close: &str) -> String {
    let lc = s.to_ascii_lowercase();
    let mut out = String::with_capacity(s.len());
    let mut cursor = 0;

    while let Some(start_rel) = lc[cursor..].find(open) {
        let start = cursor + start_rel;
        out.push_str(&s[cursor..start]);
        match lc[start..].find(close) {
            Some(end_rel) => cursor = start + end_rel + close.len(),
            None => return out,
        }
    }
    out.push_str(&s[cursor..]);
    out
}

fn table_row_value(html: &str, label: &str) -> Option<String> {
    let lc = html.to_ascii_lowercase();
    let label_lc = label.to_ascii_lowercase();

    for (open, close) in [("<tr", "</tr>"), ("<li", "</li>")] {
        let mut from = 0;
        while let Some(start_rel) = lc[from..].find(open) {
            let start = from + start_rel;
            let Some(end_rel) = lc[start..].find(close) else {
                break;
            };
            let end = start + end_rel;
            let row = strip_tags(&html[start..end]);
            let row_lc = row.to_ascii_lowercase();
            let whole_word = row_lc
                .strip_prefix(&label_lc)
                .is_some_and(|rest| !rest.starts_with(|ch: char| ch.is_alphanumeric()));
            if whole_word {
                let value = row[label.len()..]
                    .trim_start_matches(|ch: char| ch == ':' || ch == '-' || ch.is_whitespace())
                    .to_owned();
                if !value.is_empty() {
                    return Some(value);
                }
            }
            from = end + close.len();
        }
    }
    None
}

/// First unsigned integer in `text`, accepting `,` thousands separators.
pub fn first_number(text: &str) -> Option<u64> {
    let start = text.find(|ch: char| ch.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|ch| ch.is_ascii_digit() || *ch == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
