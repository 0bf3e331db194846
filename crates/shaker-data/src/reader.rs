//! Row parsing: byte stream → [`RawTable`].
//!
//! Parsing never fails. Undecodable bytes are dropped, malformed records are
//! skipped, and both are counted in [`ParseStats`].

use rayon::prelude::*;
use shaker_core::models::{ParseStats, RawTable, SourceFile};
use tracing::debug;

use crate::archive::CsvEntry;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decode `bytes` as UTF-8, dropping invalid sequences and a leading BOM.
///
/// Returns the text and the number of bytes discarded.
pub fn decode_lossy(bytes: &[u8]) -> (String, usize) {
    let mut rest = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut text = String::with_capacity(rest.len());
    let mut dropped = 0;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                if let Ok(valid) = std::str::from_utf8(valid) {
                    text.push_str(valid);
                }
                let bad = e.error_len().unwrap_or(after.len());
                dropped += bad;
                rest = &after[bad..];
            }
        }
    }

    (text, dropped)
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse a delimited byte stream into a [`RawTable`].
///
/// The first record is the header; its fields are trimmed. A record whose
/// field count differs from the header, or that the reader rejects, is
/// skipped. Blank cells become `None`. With `row_cap` set, parsing stops
/// after that many data rows.
pub fn parse_table(bytes: &[u8], row_cap: Option<usize>) -> (RawTable, ParseStats) {
    let (text, dropped_bytes) = decode_lossy(bytes);
    let mut stats = ParseStats {
        dropped_bytes,
        ..Default::default()
    };

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(record) => record.iter().map(|h| h.trim().to_string()).collect(),
        Err(e) => {
            debug!("unreadable header: {}", e);
            return (RawTable::default(), stats);
        }
    };
    if headers.is_empty() {
        return (RawTable::default(), stats);
    }

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        if row_cap.is_some_and(|cap| rows.len() >= cap) {
            stats.truncated = true;
            break;
        }

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                debug!(record = line + 1, "skipping malformed record: {}", e);
                stats.skipped_rows += 1;
                continue;
            }
        };

        if record.len() != headers.len() {
            debug!(
                record = line + 1,
                expected = headers.len(),
                found = record.len(),
                "skipping record with wrong field count"
            );
            stats.skipped_rows += 1;
            continue;
        }

        rows.push(
            record
                .iter()
                .map(|cell| {
                    if cell.trim().is_empty() {
                        None
                    } else {
                        Some(cell.to_string())
                    }
                })
                .collect(),
        );
    }

    stats.data_rows = rows.len();
    (RawTable { headers, rows }, stats)
}

/// Parse one entry into a [`SourceFile`].
pub fn parse_entry(entry: &CsvEntry, row_cap: Option<usize>) -> SourceFile {
    let (table, stats) = parse_table(&entry.bytes, row_cap);
    debug!(
        entry = %entry.name,
        rows = stats.data_rows,
        skipped = stats.skipped_rows,
        dropped_bytes = stats.dropped_bytes,
        truncated = stats.truncated,
        "parsed entry"
    );
    SourceFile {
        entry_name: entry.name.clone(),
        unit: entry.unit.clone(),
        table,
        stats,
    }
}

/// Parse every entry. Output order always matches `entries`, including when
/// `parallel` spreads the work over the rayon pool.
pub fn parse_entries(entries: &[CsvEntry], row_cap: Option<usize>, parallel: bool) -> Vec<SourceFile> {
    if parallel {
        entries
            .par_iter()
            .map(|entry| parse_entry(entry, row_cap))
            .collect()
    } else {
        entries
            .iter()
            .map(|entry| parse_entry(entry, row_cap))
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
