//! CSV interchange for desired-state sheets, exports and burn-down series.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};

use crate::burndown::{BurndownRecord, BurndownSeries};
use crate::error::SyncError;
use crate::model::field::{normalize_header, Field};
use crate::model::row::DesiredRow;
use crate::model::work_item::WorkItem;

const REQUIRED: [Field; 2] = [Field::Iid, Field::Title];

/// Reads a desired-state sheet. Unknown columns are ignored; `iid` and
/// `title` must be present before any row is returned.
pub fn read_rows<R: Read>(reader: R) -> Result<Vec<DesiredRow>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let columns: Vec<Option<Field>> = rdr
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(Field::from_column)
        .collect();

    for field in REQUIRED {
        if !columns.contains(&Some(field)) {
            return Err(SyncError::Configuration(format!("input is missing the '{field}' column")).into());
        }
    }

    let mut rows = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV line {}", idx + 2))?;
        let mut row = DesiredRow::new(idx + 1);
        for (column, value) in columns.iter().zip(record.iter()) {
            if let Some(field) = column {
                row.set(*field, value);
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

pub fn read_rows_from(path: &Path) -> Result<Vec<DesiredRow>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    read_rows(file)
}

/// Writes items in the interchange column order, blanks as empty cells.
pub fn write_items<W: Write>(writer: W, items: &[WorkItem]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(Field::ALL.iter().map(|f| f.column()))?;
    for item in items {
        wtr.write_record(Field::ALL.iter().map(|f| item.field_value(*f)))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_items(path: &Path, items: &[WorkItem]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    write_items(file, items)
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    value
        .parse::<NaiveDate>()
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|d| d.date_naive()))
}

/// Lifecycle records from a sheet with `created_at` and optional
/// `closed_at` columns.
pub fn read_burndown_records<R: Read>(reader: R) -> Result<Vec<BurndownRecord>> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(normalize_header)
        .collect();
    let position = |name: &str| headers.iter().position(|h| h == name);

    let created_col = position("created_at")
        .ok_or_else(|| SyncError::Configuration("input is missing the 'created_at' column".into()))?;
    let closed_col = position("closed_at");
    let key_col = position("iid").or_else(|| position("id"));

    let mut records = Vec::new();
    for (idx, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV line {}", idx + 2))?;
        let key = key_col
            .and_then(|c| record.get(c))
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("line {}", idx + 1));
        let cell = record.get(created_col).unwrap_or("");
        let created = parse_date(cell)
            .with_context(|| format!("{key}: cannot parse created_at {cell:?}"))?;
        let closed = match closed_col.and_then(|c| record.get(c)).map(str::trim) {
            None | Some("") => None,
            Some(cell) => Some(
                parse_date(cell).with_context(|| format!("{key}: cannot parse closed_at {cell:?}"))?,
            ),
        };
        records.push(BurndownRecord {
            key,
            created,
            closed,
        });
    }
    Ok(records)
}

pub fn write_series<W: Write>(writer: W, series: &BurndownSeries) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for point in &series.points {
        wtr.serialize(point)?;
    }
    wtr.flush()?;
    Ok(())
}
