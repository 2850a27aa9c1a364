use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::clinical::ClinicalTable;
use crate::config::ExpressionSettings;
use crate::domain::{NOT_AVAILABLE, merge_stage};
use crate::error::SkcmError;
use crate::fs_util::create_folder;
use crate::plot::write_histogram;
use crate::stats::summarize_by;
use crate::table::{Table, TableOptions, format_float, parse_float, write_atomic, write_tsv};

pub const CASE_COLUMN: &str = "case_id";
pub const STAGE_COLUMN: &str = "tumor_stage";

fn star_options() -> TableOptions {
    TableOptions {
        comment: Some(b'#'),
        ..TableOptions::default()
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateResolution {
    pub kept: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// Case folders (`<stage>/<case>`) can hold more than one count file. Each
/// file's first row value of the compare column (`unstranded` of
/// `N_unmapped`) is read and only the files with the smallest value stay.
pub fn resolve_duplicates(
    files: Vec<PathBuf>,
    compare_columns: &[String],
) -> Result<DuplicateResolution, SkcmError> {
    let compare = compare_columns
        .get(1)
        .or_else(|| compare_columns.first())
        .ok_or_else(|| SkcmError::InvalidConfig("no compare columns".to_string()))?;

    let mut by_folder = BTreeMap::<PathBuf, Vec<PathBuf>>::new();
    for file in &files {
        let folder = file.parent().map(Path::to_path_buf).unwrap_or_default();
        by_folder.entry(folder).or_default().push(file.clone());
    }

    let mut removed = Vec::new();
    for (folder, members) in by_folder.into_iter().filter(|(_, members)| members.len() > 1) {
        let mut scored = Vec::with_capacity(members.len());
        for member in members {
            let table = Table::read(
                &member,
                &TableOptions {
                    max_rows: Some(1),
                    ..star_options()
                },
            )?;
            let column = table.column(compare)?;
            let value = parse_float(table.cell(0, column)).unwrap_or(f64::INFINITY);
            scored.push((member, value));
        }
        let minimum = scored
            .iter()
            .map(|(_, value)| *value)
            .fold(f64::INFINITY, f64::min);
        for (member, value) in scored {
            if value != minimum {
                tracing::info!(
                    folder = %folder.display(),
                    file = %member.display(),
                    "removing duplicate file from list"
                );
                removed.push(member);
            }
        }
    }

    let kept = files
        .into_iter()
        .filter(|file| !removed.contains(file))
        .collect();
    Ok(DuplicateResolution { kept, removed })
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneRow {
    pub values: Vec<f64>,
    pub case_id: String,
    pub tumor_stage: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneTable {
    pub gene: String,
    pub value_columns: Vec<String>,
    pub rows: Vec<GeneRow>,
}

impl GeneTable {
    pub fn new(gene: &str, value_columns: &[String]) -> Self {
        Self {
            gene: gene.to_string(),
            value_columns: value_columns.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> Vec<String> {
        let mut headers = self.value_columns.clone();
        headers.push(CASE_COLUMN.to_string());
        headers.push(STAGE_COLUMN.to_string());
        headers
    }

    pub fn write(&self, path: &Path) -> Result<(), SkcmError> {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut cells = row.values.iter().map(|value| format_float(*value)).collect::<Vec<_>>();
                cells.push(row.case_id.clone());
                cells.push(row.tumor_stage.clone());
                cells
            })
            .collect::<Vec<_>>();
        write_tsv(path, &self.headers(), &rows)
    }

    pub fn column_values(&self, column: usize) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.values.get(column).copied().unwrap_or(f64::NAN))
            .collect()
    }

    pub fn without_zeros(&self) -> Self {
        let rows = self
            .rows
            .iter()
            .filter(|row| row.values.iter().all(|value| !value.is_nan() && *value != 0.0))
            .cloned()
            .collect();
        Self {
            gene: self.gene.clone(),
            value_columns: self.value_columns.clone(),
            rows,
        }
    }

    pub fn with_merged_stages(&self) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| GeneRow {
                tumor_stage: merge_stage(&row.tumor_stage).to_string(),
                ..row.clone()
            })
            .collect();
        Self {
            gene: self.gene.clone(),
            value_columns: self.value_columns.clone(),
            rows,
        }
    }
}

pub fn gene_search(
    files: &[PathBuf],
    genes: &[String],
    value_columns: &[String],
) -> Result<Vec<GeneTable>, SkcmError> {
    let (name_column, kept_columns) = value_columns
        .split_first()
        .ok_or_else(|| SkcmError::InvalidConfig("no value columns".to_string()))?;
    let mut tables = genes
        .iter()
        .map(|gene| GeneTable::new(gene, kept_columns))
        .collect::<Vec<_>>();

    for file in files {
        let table = Table::read(file, &star_options())?;
        let name_idx = table.column(name_column)?;
        let value_idx = kept_columns
            .iter()
            .map(|column| table.column(column))
            .collect::<Result<Vec<_>, _>>()?;
        let case_id = folder_name(file, 1);
        let tumor_stage = folder_name(file, 2);

        for row in 0..table.len() {
            let name = table.cell(row, name_idx);
            let Some(target) = tables.iter_mut().find(|target| target.gene == name) else {
                continue;
            };
            target.rows.push(GeneRow {
                values: value_idx
                    .iter()
                    .map(|idx| parse_float(table.cell(row, *idx)).unwrap_or(f64::NAN))
                    .collect(),
                case_id: case_id.clone(),
                tumor_stage: tumor_stage.clone(),
            });
        }
    }
    Ok(tables)
}

fn folder_name(file: &Path, level: usize) -> String {
    file.ancestors()
        .nth(level)
        .and_then(|folder| folder.file_name())
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string()
}

pub fn write_removed(path: &Path, pattern: &str, removed: &[PathBuf]) -> Result<(), SkcmError> {
    let mut content = format!(">Duplicate files removed for \"{pattern}\"\n");
    for file in removed {
        content.push_str(&display(file));
        content.push('\n');
    }
    write_atomic(path, content.as_bytes())
}

pub fn write_stage_stats(dir: &Path, prefix: &str, table: &GeneTable) -> Result<Vec<PathBuf>, SkcmError> {
    let mut written = Vec::new();
    for (suffix, source) in [("", table.clone()), ("_rm0", table.without_zeros())] {
        let groups = summarize_by(
            source
                .rows
                .iter()
                .map(|row| (row.tumor_stage.as_str(), row.values.as_slice())),
            source.value_columns.len(),
        );

        let count_path = dir.join(format!("{prefix}stage_count{suffix}.txt"));
        let count_rows = groups
            .iter()
            .map(|group| vec![group.key.clone(), group.count.to_string()])
            .collect::<Vec<_>>();
        write_tsv(
            &count_path,
            &[STAGE_COLUMN.to_string(), "cases".to_string()],
            &count_rows,
        )?;
        written.push(count_path);

        let mut headers = vec![STAGE_COLUMN.to_string()];
        headers.extend(source.value_columns.iter().cloned());
        for (name, pick) in [("median", true), ("mean", false)] {
            let path = dir.join(format!("{prefix}stage_{name}{suffix}.txt"));
            let rows = groups
                .iter()
                .map(|group| {
                    let values = if pick { &group.medians } else { &group.means };
                    let mut cells = vec![group.key.clone()];
                    cells.extend(values.iter().map(|value| format_float(*value)));
                    cells
                })
                .collect::<Vec<_>>();
            write_tsv(&path, &headers, &rows)?;
            written.push(path);
        }
    }
    Ok(written)
}

pub fn write_histograms(dir: &Path, table: &GeneTable) -> Result<Vec<PathBuf>, SkcmError> {
    let mut written = Vec::new();
    for (idx, column) in table.value_columns.iter().enumerate() {
        let values = table.column_values(idx);
        let path = dir.join(format!("hist_{column}.png"));
        if write_histogram(&path, &values)?.is_some() {
            written.push(path);
        }
        let nonzero = values
            .into_iter()
            .filter(|value| *value != 0.0)
            .collect::<Vec<_>>();
        let path = dir.join(format!("hist_{column}_rm0.png"));
        if write_histogram(&path, &nonzero)?.is_some() {
            written.push(path);
        }
    }
    Ok(written)
}

pub fn write_merged_table(
    path: &Path,
    merged: &GeneTable,
    clinical: &ClinicalTable,
) -> Result<usize, SkcmError> {
    let mut headers = vec![CASE_COLUMN.to_string()];
    headers.extend(merged.value_columns.iter().cloned());
    headers.extend(
        [STAGE_COLUMN, "stage_T", "stage_N", "stage_M"]
            .iter()
            .map(|value| value.to_string()),
    );

    let mut missing = 0usize;
    let rows = merged
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.case_id.clone()];
            cells.extend(row.values.iter().map(|value| format_float(*value)));
            cells.push(row.tumor_stage.clone());
            match clinical.tnm(&row.case_id) {
                Some(tnm) => cells.extend([tnm.t, tnm.n, tnm.m]),
                None => {
                    missing += 1;
                    cells.extend(std::iter::repeat_n(NOT_AVAILABLE.to_string(), 3));
                }
            }
            cells
        })
        .collect::<Vec<_>>();
    if missing > 0 {
        tracing::warn!(missing, "cases without a clinical record");
    }
    write_tsv(path, &headers, &rows)?;
    Ok(rows.len())
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneReport {
    pub gene: String,
    pub folder: String,
    pub rows: usize,
    pub stages: usize,
    pub files: Vec<String>,
}

pub fn analyze_gene(
    gene_dir: &Path,
    table: &GeneTable,
    resolution: &DuplicateResolution,
    settings: &ExpressionSettings,
    clinical: Option<&ClinicalTable>,
) -> Result<GeneReport, SkcmError> {
    let folder_name = gene_dir
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let parent = gene_dir
        .parent()
        .ok_or_else(|| SkcmError::Filesystem("gene folder without a parent".to_string()))?;
    let gene_dir = create_folder(&folder_name, parent)?;
    if table.is_empty() {
        tracing::warn!(gene = %table.gene, "gene not found in any file");
    }

    let mut files = Vec::new();
    let removed_path = gene_dir.join("files_removed.txt");
    write_removed(&removed_path, &settings.pattern, &resolution.removed)?;
    files.push(removed_path);

    let gene_path = gene_dir.join(format!("{folder_name}.txt"));
    table.write(&gene_path)?;
    files.push(gene_path);

    files.extend(write_stage_stats(&gene_dir, "", table)?);
    files.extend(write_histograms(&gene_dir, table)?);

    let merged = table.with_merged_stages();
    files.extend(write_stage_stats(&gene_dir, "merge_", &merged)?);
    if let Some(clinical) = clinical {
        let merged_path = gene_dir.join(format!("merge_{folder_name}.txt"));
        write_merged_table(&merged_path, &merged, clinical)?;
        files.push(merged_path);
    }

    let stages = table
        .rows
        .iter()
        .map(|row| row.tumor_stage.as_str())
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    Ok(GeneReport {
        gene: table.gene.clone(),
        folder: display(&gene_dir),
        rows: table.len(),
        stages,
        files: files.iter().map(|path| display(path)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[f64], case: &str, stage: &str) -> GeneRow {
        GeneRow {
            values: values.to_vec(),
            case_id: case.to_string(),
            tumor_stage: stage.to_string(),
        }
    }

    fn table() -> GeneTable {
        GeneTable {
            gene: "BRD3OS".to_string(),
            value_columns: vec!["tpm_unstranded".to_string(), "fpkm_unstranded".to_string()],
            rows: vec![
                row(&[1.0, 2.0], "TCGA-1", "Stage_IIA"),
                row(&[0.0, 4.0], "TCGA-2", "Stage_IIC"),
                row(&[3.0, 6.0], "TCGA-3", "Stage_I"),
            ],
        }
    }

    #[test]
    fn zero_rows_are_dropped() {
        let rm0 = table().without_zeros();
        assert_eq!(rm0.len(), 2);
        assert!(rm0.rows.iter().all(|row| row.case_id != "TCGA-2"));
    }

    #[test]
    fn merged_stages_collapse_substages() {
        let merged = table().with_merged_stages();
        let stages = merged
            .rows
            .iter()
            .map(|row| row.tumor_stage.as_str())
            .collect::<Vec<_>>();
        assert_eq!(stages, vec!["Stage_II", "Stage_II", "Stage_I"]);
    }

    #[test]
    fn stage_stats_files() {
        let temp = tempfile::tempdir().unwrap();
        let merged = table().with_merged_stages();
        let written = write_stage_stats(temp.path(), "merge_", &merged).unwrap();
        assert_eq!(written.len(), 6);

        let count = std::fs::read_to_string(temp.path().join("merge_stage_count.txt")).unwrap();
        assert_eq!(count, "tumor_stage\tcases\nStage_I\t1\nStage_II\t2\n");
        let median = std::fs::read_to_string(temp.path().join("merge_stage_median.txt")).unwrap();
        assert_eq!(
            median,
            "tumor_stage\ttpm_unstranded\tfpkm_unstranded\nStage_I\t3.0\t6.0\nStage_II\t0.5\t3.0\n"
        );
        let count_rm0 =
            std::fs::read_to_string(temp.path().join("merge_stage_count_rm0.txt")).unwrap();
        assert_eq!(count_rm0, "tumor_stage\tcases\nStage_I\t1\nStage_II\t1\n");
    }

    #[test]
    fn folder_levels() {
        let file = Path::new("/out/TCGA_SKCM/Stage_IIIC/TCGA-EE-A2GJ/x.tsv");
        assert_eq!(folder_name(file, 1), "TCGA-EE-A2GJ");
        assert_eq!(folder_name(file, 2), "Stage_IIIC");
    }
}
