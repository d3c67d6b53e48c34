// src/schema/mapper.rs
use std::collections::HashSet;
use tracing::{debug, warn};

use super::aliases::{fold, is_ancillary, Field, FOLDED_ALIASES};
use super::record::{CanonicalRecord, Metric};
use crate::error::{ErrorKind, Result};
use crate::process::date_parser::{format_date, master_key, parse_date_cell, parse_slot, slot_from_hm};
use crate::process::raw_table::RawTable;
use crate::process::utils::to_half_width;

/// Which raw column feeds each canonical field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnResolution {
    pub date: Option<usize>,
    pub slot: Option<usize>,
    pub metrics: [Option<usize>; Metric::COUNT],
}

impl ColumnResolution {
    fn get(&self, field: Field) -> Option<usize> {
        match field {
            Field::Date => self.date,
            Field::Slot => self.slot,
            Field::Metric(m) => self.metrics[m.index()],
        }
    }

    fn set(&mut self, field: Field, idx: usize) {
        match field {
            Field::Date => self.date = Some(idx),
            Field::Slot => self.slot = Some(idx),
            Field::Metric(m) => self.metrics[m.index()] = Some(idx),
        }
    }
}

/// Resolve headers once per table: exact folded match first, then substring,
/// each column claimed by at most one field.
pub fn resolve_columns(headers: &[String]) -> ColumnResolution {
    let folded: Vec<Option<String>> = headers
        .iter()
        .map(|h| (!is_ancillary(h)).then(|| fold(h)))
        .collect();
    let mut claimed = vec![false; headers.len()];
    let mut res = ColumnResolution {
        date: None,
        slot: None,
        metrics: [None; Metric::COUNT],
    };

    for exact in [true, false] {
        for (field, aliases) in FOLDED_ALIASES.iter() {
            if res.get(*field).is_some() {
                continue;
            }
            let hit = aliases.iter().find_map(|alias| {
                folded.iter().enumerate().position(|(i, label)| {
                    !claimed[i]
                        && label.as_deref().is_some_and(|l| {
                            if exact {
                                l == alias.as_str()
                            } else {
                                !alias.is_empty() && l.contains(alias.as_str())
                            }
                        })
                })
            });
            if let Some(idx) = hit {
                claimed[idx] = true;
                res.set(*field, idx);
                debug!(field = ?field, column = %headers[idx], exact, "resolved column");
            }
        }
    }
    res
}

/// Lenient numeric coercion. Anything unparsable becomes `0.0`.
pub fn coerce_number(raw: &str) -> f64 {
    let s: String = to_half_width(raw)
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Records produced from one table plus what was left behind.
#[derive(Debug, Default)]
pub struct MappedBatch {
    pub records: Vec<CanonicalRecord>,
    /// Rows without a usable date or slot.
    pub dropped_rows: usize,
    /// Rows whose master key repeated an earlier row.
    pub duplicate_keys: usize,
}

/// Map a parsed table onto the canonical schema.
///
/// `tag_in_key` appends the source tag to every master key; set it when the
/// target table is shared with other sources.
#[tracing::instrument(level = "debug", skip(table), fields(rows = table.rows.len()))]
pub fn map_table(table: &RawTable, source_tag: &str, tag_in_key: bool) -> Result<MappedBatch> {
    let cols = resolve_columns(&table.headers);

    let Some(date_col) = cols.date else {
        return Err(ErrorKind::SchemaMapping(format!(
            "no date column among {:?}",
            table.headers
        )));
    };
    if cols.slot.is_none()
        && !table
            .column(date_col)
            .any(|c| parse_date_cell(c).is_some_and(|d| d.time.is_some()))
    {
        return Err(ErrorKind::SchemaMapping(format!(
            "no slot column and no time part in {:?}",
            table.headers[date_col]
        )));
    }

    let unmapped: Vec<&str> = Metric::ALL
        .iter()
        .filter(|m| cols.metrics[m.index()].is_none())
        .map(|m| m.column())
        .collect();
    if !unmapped.is_empty() {
        debug!(?unmapped, "metrics without a source column default to 0");
    }

    let key_tag = tag_in_key.then_some(source_tag);
    let mut batch = MappedBatch::default();
    let mut seen = HashSet::with_capacity(table.rows.len());

    for (row_idx, row) in table.rows.iter().enumerate() {
        let date_cell = row.get(date_col).map(String::as_str).unwrap_or("");
        let Some(parsed) = parse_date_cell(date_cell) else {
            warn!(row = row_idx, cell = date_cell, "dropping row: unparsable date");
            batch.dropped_rows += 1;
            continue;
        };

        let slot = match cols.slot {
            Some(c) => parse_slot(row.get(c).map(String::as_str).unwrap_or("")),
            None => parsed.time.and_then(|(h, m)| slot_from_hm(h, m)),
        };
        let Some(slot) = slot else {
            warn!(row = row_idx, cell = date_cell, "dropping row: unparsable slot");
            batch.dropped_rows += 1;
            continue;
        };

        let date = format_date(parsed.date);
        let key = master_key(&date, slot, key_tag);
        if !seen.insert(key.clone()) {
            batch.duplicate_keys += 1;
            continue;
        }

        let mut metrics = [0.0; Metric::COUNT];
        for m in Metric::ALL {
            if let Some(c) = cols.metrics[m.index()] {
                metrics[m.index()] = row.get(c).map(|v| coerce_number(v)).unwrap_or(0.0);
            }
        }

        batch.records.push(CanonicalRecord {
            master_key: key,
            date,
            slot,
            metrics,
            source_tag: source_tag.to_string(),
        });
    }

    if batch.duplicate_keys > 0 {
        warn!(
            duplicates = batch.duplicate_keys,
            "duplicate master keys in table; kept first occurrence"
        );
    }
    Ok(batch)
}
