use calamine::{open_workbook_auto, Data, Reader};
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

/// One row of positional string fields: name, email, then anything else.
pub type RawRow = Vec<String>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no file path provided")]
    EmptyPath,

    #[error("unsupported file type '{0}', expected .csv, .xlsx, .xlsm, .xls or .ods")]
    UnsupportedFormat(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("spreadsheet has no worksheets")]
    NoWorksheet,
}

pub trait RecordSource {
    fn read_all(&self, path: &Path) -> Result<Vec<RawRow>, SourceError>;
}

/// Reads recipients from disk, choosing the decoder by file extension.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    has_header: bool,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip the first row of the file.
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    fn read_csv(&self, path: &Path) -> Result<Vec<RawRow>, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.has_header)
            .flexible(true)
            .from_path(path)?;

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(rows)
    }

    fn read_spreadsheet(&self, path: &Path) -> Result<Vec<RawRow>, SourceError> {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or(SourceError::NoWorksheet)??;

        // ranges are rectangular, trailing blank cells are not fields
        let skip = usize::from(self.has_header);
        Ok(range
            .rows()
            .skip(skip)
            .map(|row| {
                let width = row
                    .iter()
                    .rposition(|cell| !matches!(cell, Data::Empty))
                    .map_or(0, |last| last + 1);
                row[..width].iter().map(|cell| cell.to_string()).collect()
            })
            .collect())
    }
}

impl RecordSource for FileSource {
    fn read_all(&self, path: &Path) -> Result<Vec<RawRow>, SourceError> {
        if path.as_os_str().is_empty() {
            return Err(SourceError::EmptyPath);
        }

        let start_time = Instant::now();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if !matches!(extension.as_str(), "csv" | "xlsx" | "xlsm" | "xls" | "ods") {
            return Err(SourceError::UnsupportedFormat(extension));
        }
        if !path.exists() {
            return Err(SourceError::NotFound(path.display().to_string()));
        }

        info!(action = "start", component = "record_source", file_path = ?path, format = %extension, "Reading recipient file");

        let rows = if extension == "csv" {
            self.read_csv(path)?
        } else {
            self.read_spreadsheet(path)?
        };

        info!(
            action = "complete",
            component = "record_source",
            row_count = rows.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Read recipient rows"
        );
        Ok(rows)
    }
}
