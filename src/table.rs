use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::SkcmError;

/// How a tab-separated file is laid out around its header row.
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    /// Lines starting with this byte are ignored (STAR files start with `#`).
    pub comment: Option<u8>,
    /// Data rows dropped right after the header (clinical descriptor rows).
    pub skip_after_header: usize,
    /// Stop after this many data rows.
    pub max_rows: Option<usize>,
}

/// In-memory string table read from a TSV file.
#[derive(Debug, Clone)]
pub struct Table {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn read(path: &Path, options: &TableOptions) -> Result<Self, SkcmError> {
        if !path.exists() {
            return Err(SkcmError::MissingInput(path.to_path_buf()));
        }
        let file = fs::File::open(path)
            .map_err(|err| SkcmError::Filesystem(format!("open {}: {err}", path.display())))?;
        Self::from_reader(file, path, options)
    }

    pub fn from_reader<R: Read>(
        reader: R,
        path: &Path,
        options: &TableOptions,
    ) -> Result<Self, SkcmError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .comment(options.comment)
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|err| SkcmError::TableParse {
                path: path.to_path_buf(),
                message: format!("failed to read header: {err}"),
            })?
            .iter()
            .map(|value| value.trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            if index < options.skip_after_header {
                continue;
            }
            if options
                .max_rows
                .is_some_and(|max_rows| rows.len() >= max_rows)
            {
                break;
            }
            let record = record.map_err(|err| SkcmError::TableParse {
                path: path.to_path_buf(),
                message: format!("row {}: {err}", index + 1),
            })?;
            rows.push(record.iter().map(|value| value.trim().to_string()).collect());
        }

        Ok(Self {
            path: path.to_path_buf(),
            headers,
            rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Result<usize, SkcmError> {
        self.headers
            .iter()
            .position(|header| header == name)
            .ok_or_else(|| SkcmError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
            })
    }

    /// Cell value; short rows read as empty.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|values| values.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Writes a TSV file atomically (temp file in the same folder, then rename).
pub fn write_tsv(path: &Path, headers: &[String], rows: &[Vec<String>]) -> Result<(), SkcmError> {
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_writer(Vec::new());
    writer
        .write_record(headers)
        .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    for row in rows {
        writer
            .write_record(row)
            .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    write_atomic(path, &bytes)
}

pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), SkcmError> {
    let parent = path
        .parent()
        .ok_or_else(|| SkcmError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent).map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("skcm-write")
        .tempfile_in(parent)
        .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    temp.persist(path)
        .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Float formatting for written tables: integral values keep one decimal
/// (`3.0`), missing values are empty.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return String::new();
    }
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        return format!("{value:.1}");
    }
    format!("{value}")
}

/// Parses a numeric cell; empty and bracketed values are `None`.
pub fn parse_float(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('[') {
        return None;
    }
    value.parse::<f64>().ok().filter(|parsed| !parsed.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_star_layout() {
        let text = "# gene-model: GENCODE v36\n\
gene_id\tgene_name\tunstranded\ttpm_unstranded\n\
N_unmapped\t\t120\t\n\
ENSG01\tBRD3OS\t5\t1.5\n";
        let table = Table::from_reader(
            text.as_bytes(),
            Path::new("counts.tsv"),
            &TableOptions {
                comment: Some(b'#'),
                ..TableOptions::default()
            },
        )
        .unwrap();
        assert_eq!(table.headers()[1], "gene_name");
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 2), "120");
        assert_eq!(table.cell(1, 1), "BRD3OS");
    }

    #[test]
    fn skips_descriptor_rows_and_limits() {
        let text = "a\tb\nA\tB\nCDE:1\tCDE:2\n1\t2\n3\t4\n5\t6\n";
        let table = Table::from_reader(
            text.as_bytes(),
            Path::new("clinical.txt"),
            &TableOptions {
                skip_after_header: 2,
                max_rows: Some(2),
                ..TableOptions::default()
            },
        )
        .unwrap();
        assert_eq!(table.rows(), &[vec!["1", "2"], vec!["3", "4"]]);
        assert!(table.column("c").is_err());
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_float(3.0), "3.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(f64::NAN), "");
        assert_eq!(parse_float("[Not Available]"), None);
        assert_eq!(parse_float(" 42 "), Some(42.0));
    }

    #[test]
    fn write_then_read() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("out").join("table.txt");
        write_tsv(
            &path,
            &["tumor_stage".to_string(), "cases".to_string()],
            &[vec!["Stage_I".to_string(), "4".to_string()]],
        )
        .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "tumor_stage\tcases\nStage_I\t4\n");
    }
}
