//! SQL identifier derivation from file names and CSV headers.
//!
//! [`normalize`] folds arbitrary text into a lowercase ASCII identifier:
//! accents are stripped through canonical decomposition, everything outside
//! `[a-z0-9\n]` becomes an underscore, leading digits and underscores are
//! dropped, underscore runs collapse, and the result is cut to
//! [`MAX_IDENTIFIER_CHARS`] code points. The cap leaves room below PostgreSQL's
//! 63-byte identifier limit for the `_<n>` suffixes [`ColumnNamer`] appends.

use std::collections::HashSet;

use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

pub const MAX_IDENTIFIER_CHARS: usize = 59;
/// PostgreSQL silently truncates identifiers past this many bytes.
pub const POSTGRES_IDENTIFIER_LIMIT: usize = 63;

const CSV_EXTENSION: &str = ".csv";

pub fn normalize(raw: &str) -> String {
    let stem = strip_csv_extension(raw);
    let folded = stem
        .nfd()
        .filter(|ch| !is_combining_mark(*ch))
        .nfc()
        .collect::<String>()
        .to_lowercase();
    let replaced = folded
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '\n' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let trimmed = replaced
        .trim_start_matches(|ch: char| ch.is_ascii_digit() || ch == '_')
        .trim_end_matches('_');
    let collapsed = collapse_underscores(trimmed);
    // A hard cut can land on an underscore; trim it so normalize stays idempotent.
    truncate_chars(&collapsed, MAX_IDENTIFIER_CHARS)
        .trim_end_matches('_')
        .to_string()
}

fn strip_csv_extension(raw: &str) -> &str {
    let split = raw.len().saturating_sub(CSV_EXTENSION.len());
    match (raw.get(..split), raw.get(split..)) {
        (Some(stem), Some(extension)) if extension.eq_ignore_ascii_case(CSV_EXTENSION) => stem,
        _ => raw,
    }
}

fn collapse_underscores(value: &str) -> String {
    let mut collapsed = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(ch);
    }
    collapsed
}

fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &value[..byte_index],
        None => value,
    }
}

/// Double-quotes an identifier so keywords such as `desc` stay valid column names.
pub fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quotes each dot-separated part of a possibly schema-qualified name.
pub fn quote_qualified(name: &str) -> String {
    name.split('.').map(quote).collect::<Vec<_>>().join(".")
}

/// Hands out column names unique within one table.
///
/// Headers that normalize to nothing become `column_<n>`; a name already handed
/// out gets `_<n>` appended. `n` is the 1-based source position of the header.
#[derive(Debug, Default)]
pub struct ColumnNamer {
    taken: HashSet<String>,
}

impl ColumnNamer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, header: &str, position: usize) -> String {
        let mut base = normalize(header);
        if base.is_empty() {
            base = format!("column_{position}");
        }
        if self.taken.insert(base.clone()) {
            return base;
        }
        let mut candidate = with_suffix(&base, &format!("_{position}"));
        let mut attempt = 2usize;
        while !self.taken.insert(candidate.clone()) {
            candidate = with_suffix(&base, &format!("_{position}_{attempt}"));
            attempt += 1;
        }
        candidate
    }
}

fn with_suffix(base: &str, suffix: &str) -> String {
    let keep = POSTGRES_IDENTIFIER_LIMIT.saturating_sub(suffix.len());
    let stem = truncate_chars(base, keep).trim_end_matches('_');
    format!("{stem}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_extension_is_case_insensitive() {
        assert_eq!(normalize("Orders.CSV"), "orders");
        assert_eq!(normalize("orders.csv.csv"), "orders_csv");
        assert_eq!(normalize("orders.tsv"), "orders_tsv");
    }

    #[test]
    fn extension_check_respects_char_boundaries() {
        assert_eq!(normalize("\u{e9}t\u{e9}"), "ete");
        assert_eq!(normalize(".csv"), "");
    }

    #[test]
    fn newline_survives_normalization() {
        assert_eq!(normalize("first\nsecond"), "first\nsecond");
    }

    #[test]
    fn truncation_never_leaves_a_trailing_underscore() {
        let raw = format!("{}_tail", "a".repeat(MAX_IDENTIFIER_CHARS - 1));
        let normalized = normalize(&raw);
        assert_eq!(normalized, "a".repeat(MAX_IDENTIFIER_CHARS - 1));
        assert_eq!(normalize(&normalized), normalized);
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        assert_eq!(quote("desc"), "\"desc\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
        assert_eq!(
            quote_qualified("public.core_raw_tables_id_seq"),
            "\"public\".\"core_raw_tables_id_seq\""
        );
    }

    #[test]
    fn namer_fills_empty_names_from_position() {
        let mut namer = ColumnNamer::new();
        assert_eq!(namer.assign("", 2), "column_2");
        assert_eq!(namer.assign("123", 3), "column_3");
        assert_eq!(namer.assign("\u{42e}", 4), "column_4");
    }

    #[test]
    fn namer_suffixes_collisions_with_source_position() {
        let mut namer = ColumnNamer::new();
        assert_eq!(namer.assign("Order ID", 1), "order_id");
        assert_eq!(namer.assign("order-id", 2), "order_id_2");
        assert_eq!(namer.assign("ORDER ID", 3), "order_id_3");
        assert_eq!(namer.assign("order_id_2", 4), "order_id_2_4");
    }

    #[test]
    fn namer_keeps_suffixed_names_within_the_postgres_limit() {
        let mut namer = ColumnNamer::new();
        let header = "x".repeat(80);
        let first = namer.assign(&header, 1);
        let second = namer.assign(&header, 1234);
        assert_eq!(first.len(), MAX_IDENTIFIER_CHARS);
        assert_eq!(second.len(), POSTGRES_IDENTIFIER_LIMIT);
        assert!(second.ends_with("_1234"));
    }
}
