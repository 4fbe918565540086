use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::harvest::RecordSink;
use crate::record::{header_names, Field, RawJobRecord};

/// A CSV file loaded into memory: header row plus data rows.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Rows that could not be decoded and were left out.
    pub skipped: usize,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Read a whole CSV artifact. Undecodable rows (bad UTF-8, wrong field count) are
/// skipped with a warning instead of failing the read.
pub fn read_table(path: &Path) -> Result<Table> {
    if !path.exists() {
        return Err(Error::MissingArtifact(path.display().to_string()));
    }
    let mut reader = csv::ReaderBuilder::new().from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut table = Table {
        headers,
        ..Default::default()
    };
    for (i, record) in reader.records().enumerate() {
        match record {
            Ok(r) => table.rows.push(r.iter().map(str::to_string).collect()),
            Err(e) => {
                warn!("{}: skipping row {}: {}", path.display(), i + 1, e);
                table.skipped += 1;
            }
        }
    }
    debug!(
        "read {} rows ({} skipped) from {}",
        table.rows.len(),
        table.skipped,
        path.display()
    );
    Ok(table)
}

/// Write a CSV artifact, replacing whatever was there.
pub fn write_table(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Append one JSON document as a line, creating the file if needed.
pub fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let line = serde_json::to_string(value).map_err(std::io::Error::from)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Raw artifact writer for one harvest run.
///
/// The file is created (truncating any previous run) together with its header when
/// the first record arrives; later records append. `flush` pushes buffered rows to
/// disk so a cancelled run keeps everything flushed so far.
pub struct ArtifactWriter {
    path: PathBuf,
    layout: &'static [(Field, &'static str)],
    writer: Option<csv::Writer<File>>,
    written: usize,
}

impl ArtifactWriter {
    pub fn new(path: impl Into<PathBuf>, layout: &'static [(Field, &'static str)]) -> Self {
        ArtifactWriter {
            path: path.into(),
            layout,
            writer: None,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }

    fn open(&mut self) -> Result<&mut csv::Writer<File>> {
        let writer = match self.writer.take() {
            Some(w) => w,
            None => {
                ensure_parent(&self.path)?;
                let mut w = csv::Writer::from_path(&self.path)?;
                w.write_record(header_names(self.layout))?;
                w
            }
        };
        Ok(self.writer.insert(writer))
    }
}

impl RecordSink for ArtifactWriter {
    fn append(&mut self, record: &RawJobRecord) -> Result<()> {
        let row = record.to_row(self.layout);
        self.open()?.write_record(&row)?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(w) = self.writer.as_mut() {
            w.flush()?;
        }
        Ok(())
    }
}
