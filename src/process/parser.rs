// src/process/parser.rs
use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{ErrorKind, Result};
use crate::process::raw_table::RawTable;
use crate::process::utils::{clean_str, is_blank_row};

/// Per-source layout hints for the tabular parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseHints {
    /// 0, 1 or 2 header rows.
    pub header_rows: u8,
    /// Physical lines to discard before the header (titles, download stamps).
    pub skip_leading_rows: usize,
}

impl Default for ParseHints {
    fn default() -> Self {
        Self {
            header_rows: 1,
            skip_leading_rows: 0,
        }
    }
}

/// Keywords marking the annotation row some publishers put under the header.
const ANNOTATION_KEYWORDS: [&str; 3] = ["品質", "均質", "現象なし"];

/// Unit suffixes rewritten into label-safe tokens, half- and full-width brackets.
const UNIT_SUFFIXES: &[(&str, &str)] = &[
    ("(℃)", "_degc"),
    ("（℃）", "_degc"),
    ("(時間)", "_h"),
    ("（時間）", "_h"),
    ("(m/s)", "_mps"),
    ("（m/s）", "_mps"),
    ("(mm)", "_mm"),
    ("（mm）", "_mm"),
    ("(hPa)", "_hpa"),
    ("（hPa）", "_hpa"),
    ("(MJ/㎡)", "_mj_per_m2"),
    ("（MJ/㎡）", "_mj_per_m2"),
    ("(cm)", "_cm"),
    ("（cm）", "_cm"),
    ("(%)", "_percent"),
    ("（%）", "_percent"),
];

const BRACKETS: &[char] = &['(', ')', '（', '）', '[', ']', '［', '］', '「', '」'];

/// Trim, rewrite unit suffixes, spaces to `_`, drop leftover brackets, lowercase.
pub fn normalize_label(raw: &str) -> String {
    let mut s = clean_str(raw);
    for (from, to) in UNIT_SUFFIXES {
        if s.contains(from) {
            s = s.replace(from, to);
        }
    }
    s.chars()
        .filter(|c| !BRACKETS.contains(c))
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// Parse decoded text into a [`RawTable`].
///
/// A structurally broken layout is retried once without headers before
/// giving up with [`ErrorKind::Parse`].
#[tracing::instrument(level = "debug", skip(text), fields(len = text.len()))]
pub fn parse(text: &str, hints: ParseHints) -> Result<RawTable> {
    let records = read_records(text, hints.skip_leading_rows)?;
    if records.is_empty() {
        return Err(ErrorKind::Parse("no records after skipping leading rows".into()));
    }

    match build_table(&records, hints.header_rows) {
        Ok(table) => Ok(table),
        Err(reason) if hints.header_rows > 0 => {
            warn!(
                header_rows = hints.header_rows,
                %reason,
                "header layout rejected; retrying without headers"
            );
            build_table(&records, 0)
                .map_err(|r| ErrorKind::Parse(format!("{reason}; header-less retry: {r}")))
        }
        Err(reason) => Err(ErrorKind::Parse(reason)),
    }
}

// ─── 1) raw records ───

fn read_records(text: &str, skip_lines: usize) -> Result<Vec<Vec<String>>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let mut out = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record =
            result.map_err(|e| ErrorKind::Parse(format!("CSV error at record {idx}: {e}")))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if (line as usize) <= skip_lines {
            continue;
        }
        let cells: Vec<String> = record.iter().map(clean_str).collect();
        if is_blank_row(&cells) {
            continue;
        }
        out.push(cells);
    }
    debug!(records = out.len(), skipped_lines = skip_lines, "read CSV records");
    Ok(out)
}

// ─── 2) headers + rows ───

fn build_table(records: &[Vec<String>], header_rows: u8) -> std::result::Result<RawTable, String> {
    let h = header_rows as usize;
    if records.len() < h {
        return Err(format!(
            "{} record(s) cannot hold {} header row(s)",
            records.len(),
            h
        ));
    }

    let headers: Vec<String> = match header_rows {
        0 => {
            let width = records.iter().map(Vec::len).max().unwrap_or(0);
            (0..width).map(|i| format!("col_{i}")).collect()
        }
        1 => records[0]
            .iter()
            .enumerate()
            .map(|(i, c)| if c.is_empty() { format!("col_{i}") } else { c.clone() })
            .collect(),
        2 => {
            if records[0].len() != records[1].len() {
                return Err(format!(
                    "header rows differ in width ({} vs {})",
                    records[0].len(),
                    records[1].len()
                ));
            }
            merge_header_rows(&records[0], &records[1])
        }
        n => return Err(format!("unsupported header row count {n}")),
    };
    let headers = dedup_labels(headers);
    let width = headers.len();

    let mut data = &records[h..];
    if h > 0 {
        if let Some(first) = data.first() {
            if is_annotation_row(first) {
                debug!(row = ?first, "dropping annotation row under header");
                data = &data[1..];
            }
        }
    }

    let mut rows = Vec::with_capacity(data.len());
    for (i, rec) in data.iter().enumerate() {
        if rec.iter().skip(width).any(|c| !c.is_empty()) {
            return Err(format!(
                "data row {} has {} cells with data beyond header width {}",
                i,
                rec.len(),
                width
            ));
        }
        let mut row = rec.clone();
        row.resize(width, String::new());
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

fn merge_header_rows(top: &[String], sub: &[String]) -> Vec<String> {
    top.iter()
        .zip(sub)
        .enumerate()
        .map(|(i, (a, b))| {
            let primary = b.is_empty() || b.starts_with("Unnamed");
            match (a.is_empty(), primary) {
                (false, false) => format!("{}_{}", normalize_label(a), normalize_label(b)),
                (false, true) => format!("{}_main", normalize_label(a)),
                (true, false) => normalize_label(b),
                (true, true) => format!("col_{i}"),
            }
        })
        .collect()
}

fn dedup_labels(labels: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    labels
        .into_iter()
        .map(|label| {
            let n = seen.entry(label.clone()).or_insert(0);
            let out = if *n == 0 {
                label
            } else {
                format!("{label}_{n}")
            };
            *n += 1;
            out
        })
        .collect()
}

fn is_annotation_row(row: &[String]) -> bool {
    let first_empty = row.first().map_or(true, |c| c.is_empty());
    first_empty
        || row
            .iter()
            .any(|c| ANNOTATION_KEYWORDS.iter().any(|k| c.contains(k)))
}
