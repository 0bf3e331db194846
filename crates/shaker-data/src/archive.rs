//! Upload discovery: turns a ZIP archive, a single CSV file or a directory
//! into an ordered list of named CSV byte streams.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use shaker_core::error::{Result, ShakerError};
use shaker_core::formatting::size_mb;
use shaker_core::settings::InputKind;
use tracing::{debug, info, warn};

/// Suffix an entry must carry to be treated as CSV. Matched case-sensitively.
pub const CSV_SUFFIX: &str = ".csv";

// ── Types ─────────────────────────────────────────────────────────────────────

/// One candidate CSV stream of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvEntry {
    /// Entry name as found in the archive, or the path relative to the
    /// scanned directory.
    pub name: String,
    /// Unit label derived from the name (file stem).
    pub unit: String,
    pub bytes: Vec<u8>,
}

impl CsvEntry {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let unit = unit_label(&name);
        Self { name, unit, bytes }
    }
}

/// Everything read from the input path for one batch.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File or directory name of the input.
    pub name: String,
    /// Total bytes read from disk.
    pub size_bytes: usize,
    /// Candidate streams in batch order. Empty means no CSV was found.
    pub entries: Vec<CsvEntry>,
}

impl Upload {
    /// Input size in megabytes, rounded to 2 places.
    pub fn size_mb(&self) -> f64 {
        size_mb(self.size_bytes)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Derive a unit label from an entry name: path and extension removed.
///
/// `"logs/Shaker_A.csv"` becomes `"Shaker_A"`.
pub fn unit_label(name: &str) -> String {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => file_name.to_string(),
    }
}

/// List the CSV entries of a ZIP archive held in memory, in archive order.
///
/// Directory entries and names without a `.csv` suffix are skipped. An empty
/// result is not an error; the caller decides how to present it.
pub fn extract_csv_entries(name: &str, bytes: &[u8]) -> Result<Vec<CsvEntry>> {
    let archive_error = |source: zip::result::ZipError| ShakerError::ArchiveFormat {
        name: name.to_string(),
        source,
    };

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(archive_error)?;
    let mut entries = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(archive_error)?;
        let entry_name = file.name().to_string();

        if file.is_dir() || !entry_name.ends_with(CSV_SUFFIX) {
            debug!(archive = name, entry = %entry_name, "skipping non-CSV entry");
            continue;
        }

        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)
            .map_err(|e| archive_error(e.into()))?;
        entries.push(CsvEntry::new(entry_name, buf));
    }

    if entries.is_empty() {
        warn!(archive = name, "no CSV entries found in archive");
    } else {
        info!(archive = name, count = entries.len(), "extracted CSV entries");
    }
    Ok(entries)
}

/// Find all `.csv` files recursively under `dir`, sorted by path.
pub fn find_csv_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Input directory does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .file_name()
                    .to_str()
                    .map(|n| n.ends_with(CSV_SUFFIX))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Read the input at `path` according to `kind`.
pub fn load_upload(path: &Path, kind: InputKind) -> Result<Upload> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    match kind {
        InputKind::Zip => {
            let bytes = read_file(path)?;
            let entries = extract_csv_entries(&name, &bytes)?;
            Ok(Upload {
                name,
                size_bytes: bytes.len(),
                entries,
            })
        }
        InputKind::Csv => {
            let bytes = read_file(path)?;
            let size_bytes = bytes.len();
            Ok(Upload {
                entries: vec![CsvEntry::new(name.clone(), bytes)],
                name,
                size_bytes,
            })
        }
        InputKind::Dir => {
            let files = find_csv_files(path);
            let mut entries = Vec::with_capacity(files.len());
            let mut size_bytes = 0;
            for file in &files {
                let bytes = read_file(file)?;
                size_bytes += bytes.len();
                let rel = file.strip_prefix(path).unwrap_or(file);
                entries.push(CsvEntry::new(rel.to_string_lossy().into_owned(), bytes));
            }
            if entries.is_empty() {
                warn!("No CSV files found in {}", path.display());
            } else {
                info!(dir = %path.display(), count = entries.len(), "found CSV files");
            }
            Ok(Upload {
                name,
                size_bytes,
                entries,
            })
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|source| ShakerError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
