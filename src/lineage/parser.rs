use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Table-valued functions and array generators that can follow FROM/JOIN.
const FUNCTION_LIKE: &[&str] = &[
    "UNNEST",
    "GENERATE_ARRAY",
    "GENERATE_DATE_ARRAY",
    "GENERATE_TIMESTAMP_ARRAY",
];

const SEGMENT: &str = r"(?:`[^`]+`|[A-Za-z_][A-Za-z0-9_\-]*)";

struct Patterns {
    whitespace: Regex,
    non_table_from: Regex,
    from_join: Regex,
    backticked: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let ident = format!(r"{seg}(?:\s?\.\s?{seg})*", seg = SEGMENT);
        Patterns {
            whitespace: Regex::new(r"\s+").expect("static regex"),
            non_table_from: Regex::new(r"(?i)\b(EXTRACT\s?\(\s?\w+|DISTINCT)\s+FROM\b").expect("static regex"),
            from_join: Regex::new(&format!(r"(?i)\b(?:FROM|JOIN)\s+({ident})(\s?\()?")).expect("static regex"),
            backticked: Regex::new(r"`([^`]+)`(\s?\()?").expect("static regex"),
        }
    })
}

/// Table and view identifiers named by a SQL text, found lexically.
///
/// Entries are dotted 2- or 3-segment identifiers with backticks removed,
/// case preserved. CTE names, derived tables and dynamic SQL are not resolved.
#[derive(Debug, Clone, Default)]
pub struct SqlReferences {
    pub tables: BTreeSet<String>,
}

impl SqlReferences {
    pub fn extract(sql: &str) -> Self {
        let p = patterns();
        let cleaned = mask_comments_and_literals(sql);
        let cleaned = p.whitespace.replace_all(&cleaned, " ");
        let cleaned = p.non_table_from.replace_all(&cleaned, "${1} ");

        let mut refs = SqlReferences::default();

        for caps in p.from_join.captures_iter(&cleaned) {
            if caps.get(2).is_some() {
                continue;
            }
            if let Some(ident) = caps.get(1) {
                refs.add_candidate(ident.as_str());
            }
        }

        for caps in p.backticked.captures_iter(&cleaned) {
            if caps.get(2).is_some() {
                continue;
            }
            if let Some(ident) = caps.get(1) {
                refs.add_candidate(ident.as_str());
            }
        }

        refs
    }

    fn add_candidate(&mut self, raw: &str) {
        match normalize_candidate(raw) {
            Ok(normalized) => {
                if !is_excluded(&normalized) {
                    self.tables.insert(normalized);
                }
            }
            Err(Rejected::Unqualified) => debug!("Skipping unqualified name {}", raw),
            Err(reason @ Rejected::TooManySegments) => warn!("Skipping {}: {}", raw, reason),
            Err(reason) => debug!("Skipping {}: {}", raw, reason),
        }
    }

    /// True if any extracted identifier ends with `name` on a segment boundary.
    pub fn mentions(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t == name || t.ends_with(&format!(".{}", name)))
    }
}

/// Lexical extraction of candidate table/view identifiers from SQL text.
pub fn extract_references(sql: &str) -> BTreeSet<String> {
    SqlReferences::extract(sql).tables
}

/// Why a FROM/JOIN or backticked identifier is not a table candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejected {
    /// One segment: a CTE, alias or dataset-less name.
    Unqualified,
    TooManySegments,
    EmptySegment,
    /// Wildcard tables, partition decorators and other non-identifier text.
    InvalidCharacters,
}

impl std::fmt::Display for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Rejected::Unqualified => "no dataset",
            Rejected::TooManySegments => "more than 3 dot-separated segments",
            Rejected::EmptySegment => "empty segment",
            Rejected::InvalidCharacters => "not a single table name",
        };
        f.write_str(reason)
    }
}

fn normalize_candidate(raw: &str) -> Result<String, Rejected> {
    let unquoted: String = raw.chars().filter(|c| *c != '`' && !c.is_whitespace()).collect();
    let segments: Vec<&str> = unquoted.split('.').collect();

    match segments.len() {
        1 => return Err(Rejected::Unqualified),
        2 | 3 => {}
        _ => return Err(Rejected::TooManySegments),
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Rejected::EmptySegment);
    }
    if !segments.iter().all(|s| s.chars().all(is_identifier_char)) {
        return Err(Rejected::InvalidCharacters);
    }

    Ok(segments.join("."))
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn is_excluded(candidate: &str) -> bool {
    candidate.split('.').any(|segment| {
        let upper = segment.to_ascii_uppercase();
        FUNCTION_LIKE.contains(&upper.as_str())
            || upper == "INFORMATION_SCHEMA"
            || upper == "_SESSION"
            || upper.starts_with("_SCRIPT")
    })
}

/// Removes `--` and `/* */` comments and blanks the contents of string
/// literals, so neither can contribute a reference. Backtick-quoted
/// identifiers are kept verbatim. Quote characters stay in place.
fn mask_comments_and_literals(sql: &str) -> String {
    let chars: Vec<char> = sql.chars().collect();
    let len = chars.len();
    let mut out = String::with_capacity(sql.len());
    let mut i = 0;

    while i < len {
        let c = chars[i];
        match c {
            '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&n| n == '`')
                    .map_or(len, |p| i + p + 2);
                out.extend(&chars[i..end]);
                i = end;
            }
            '\'' | '"' => {
                let width = if chars.get(i + 1) == Some(&c) && chars.get(i + 2) == Some(&c) { 3 } else { 1 };
                out.extend(&chars[i..i + width]);
                i += width;

                while i < len {
                    if chars[i] == '\\' {
                        out.push_str(if i + 1 < len { "  " } else { " " });
                        i += 2;
                    } else if chars[i..].iter().take(width).filter(|&&n| n == c).count() == width {
                        out.extend(&chars[i..i + width]);
                        i += width;
                        break;
                    } else {
                        out.push(' ');
                        i += 1;
                    }
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                match chars[i..].iter().position(|&n| n == '\n') {
                    Some(p) => {
                        out.push('\n');
                        i += p + 1;
                    }
                    None => i = len,
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i = chars[i + 2..]
                    .windows(2)
                    .position(|w| w == ['*', '/'])
                    .map_or(len, |p| i + p + 4);
                out.push(' ');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}
