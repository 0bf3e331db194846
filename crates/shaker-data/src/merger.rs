//! Concatenation of per-file tables into one [`UnifiedTable`].

use std::collections::HashMap;

use shaker_core::error::{Result, ShakerError};
use shaker_core::models::{SourceFile, UnifiedRow, UnifiedTable};
use tracing::info;

/// Merge `sources` over the outer union of their columns.
///
/// Columns appear in first-seen order. Rows keep their order within each
/// source and sources keep their order in the slice, so the first file's rows
/// come first. A row gets `None` for every column its source lacks. Sources
/// are borrowed; the result owns copies of every cell.
pub fn merge(sources: &[SourceFile]) -> Result<UnifiedTable> {
    if sources.is_empty() {
        return Err(ShakerError::EmptyBatch { files: 0 });
    }

    let mut columns: Vec<String> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for source in sources {
        for header in &source.table.headers {
            if !positions.contains_key(header.as_str()) {
                positions.insert(header.as_str(), columns.len());
                columns.push(header.clone());
            }
        }
    }

    let total: usize = sources.iter().map(|s| s.table.len()).sum();
    let mut rows = Vec::with_capacity(total);
    for source in sources {
        // Unified position of each source column. Duplicate header names in
        // one file resolve to the first occurrence.
        let mapping: Vec<usize> = source
            .table
            .headers
            .iter()
            .map(|h| positions[h.as_str()])
            .collect();

        for raw in &source.table.rows {
            let mut cells = vec![None; columns.len()];
            for (value, &target) in raw.iter().zip(&mapping) {
                if cells[target].is_none() {
                    cells[target] = value.clone();
                }
            }
            rows.push(UnifiedRow {
                unit: source.unit.clone(),
                cells,
            });
        }
    }

    if rows.is_empty() {
        return Err(ShakerError::EmptyBatch {
            files: sources.len(),
        });
    }

    info!(
        files = sources.len(),
        rows = rows.len(),
        columns = columns.len(),
        "merged batch"
    );
    Ok(UnifiedTable { columns, rows })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
