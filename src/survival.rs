use std::collections::HashMap;
use std::path::Path;

use ndarray::Array2;
use serde::Serialize;

use crate::clinical::{ClinicalTable, SurvivalOutcome};
use crate::config::SurvivalSettings;
use crate::cox::{CoxModel, CoxSummary, SurvivalData};
use crate::domain::stage_ordinal;
use crate::error::SkcmError;
use crate::expression::STAGE_COLUMN;
use crate::fs_util::create_folder;
use crate::stats::quantile;
use crate::table::{Table, TableOptions, format_float, parse_float, write_atomic, write_tsv};

pub const DURATION_COL: &str = "days";
pub const EVENT_COL: &str = "vital_status";
pub const SUMMARY_FILE: &str = "CoxPHFitter.txt";
pub const COHORT_FILE: &str = "cox_input.txt";

/// One patient of the per-gene table: expression of the first value column
/// and the merged tumor stage.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneExpression {
    pub barcode: String,
    pub value: f64,
    pub tumor_stage: String,
}

/// Reads `merge_<gene>.txt`: barcode in the first column, the expression
/// value in the second.
pub fn read_gene_table(path: &Path) -> Result<(String, Vec<GeneExpression>), SkcmError> {
    let table = Table::read(path, &TableOptions::default())?;
    let value_column = table
        .headers()
        .get(1)
        .cloned()
        .ok_or_else(|| SkcmError::TableParse {
            path: path.to_path_buf(),
            message: "expected a barcode column and a value column".to_string(),
        })?;
    let stage = table.column(STAGE_COLUMN)?;
    let rows = (0..table.len())
        .map(|row| GeneExpression {
            barcode: table.cell(row, 0).to_string(),
            value: parse_float(table.cell(row, 1)).unwrap_or(f64::NAN),
            tumor_stage: table.cell(row, stage).to_string(),
        })
        .collect();
    Ok((value_column, rows))
}

/// One joined, encoded patient ready for the model.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortRow {
    pub barcode: String,
    pub days: f64,
    pub vital_status: u8,
    pub tumor_stage: f64,
    pub indicator: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CohortCounts {
    pub outcomes: usize,
    pub joined: usize,
    pub dropped_stage: usize,
    pub duplicate_barcodes: usize,
}

/// Inner-joins outcomes with the gene table in outcome order. The gene
/// indicator is 1 when the value reaches `cutoff`; rows whose stage has no
/// ordinal are dropped.
pub fn build_cohort(
    outcomes: &[SurvivalOutcome],
    genes: &[GeneExpression],
    cutoff: f64,
) -> (Vec<CohortRow>, CohortCounts) {
    let mut counts = CohortCounts {
        outcomes: outcomes.len(),
        ..CohortCounts::default()
    };
    let mut by_barcode = HashMap::<&str, &GeneExpression>::new();
    for gene in genes {
        if by_barcode.insert(gene.barcode.as_str(), gene).is_some() {
            counts.duplicate_barcodes += 1;
        }
    }
    // First row wins.
    for gene in genes.iter().rev() {
        by_barcode.insert(gene.barcode.as_str(), gene);
    }
    if counts.duplicate_barcodes > 0 {
        tracing::warn!(
            duplicates = counts.duplicate_barcodes,
            "duplicate barcodes in gene table, keeping the first row"
        );
    }

    let mut rows = Vec::new();
    for outcome in outcomes {
        let Some(gene) = by_barcode.get(outcome.barcode.as_str()) else {
            continue;
        };
        counts.joined += 1;
        let Some(tumor_stage) = stage_ordinal(&gene.tumor_stage) else {
            counts.dropped_stage += 1;
            continue;
        };
        rows.push(CohortRow {
            barcode: outcome.barcode.clone(),
            days: outcome.days,
            vital_status: outcome.vital_status,
            tumor_stage,
            indicator: if gene.value >= cutoff { 1.0 } else { 0.0 },
        });
    }
    (rows, counts)
}

pub fn cohort_data(rows: &[CohortRow], gene: &str) -> Result<SurvivalData, SkcmError> {
    let covariates = Array2::from_shape_vec(
        (rows.len(), 2),
        rows.iter()
            .flat_map(|row| [row.tumor_stage, row.indicator])
            .collect(),
    )
    .map_err(|err| SkcmError::InvalidDimensions(err.to_string()))?;
    SurvivalData::new(
        rows.iter().map(|row| row.days).collect(),
        rows.iter().map(|row| row.vital_status == 1).collect(),
        covariates,
        vec![STAGE_COLUMN.to_string(), gene.to_string()],
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct SurvivalResult {
    pub gene: String,
    pub value_column: String,
    pub quantile: f64,
    pub cutoff: f64,
    pub counts: CohortCounts,
    pub observations: usize,
    pub summary_path: String,
    pub cohort_path: String,
    pub summary: CoxSummary,
}

/// Survival analysis for one gene: cutoff on the gene table, join with the
/// clinical outcomes, Cox fit and the written summary.
pub fn run_survival(
    gene_dir: &Path,
    gene_table: &Path,
    clinical: &ClinicalTable,
    settings: &SurvivalSettings,
) -> Result<SurvivalResult, SkcmError> {
    let survival_dir = create_folder(crate::store::SURVIVAL_FOLDER, gene_dir)?;
    let outcomes = clinical.outcomes()?;
    tracing::info!(patients = outcomes.len(), "survival outcomes");

    let (value_column, genes) = read_gene_table(gene_table)?;
    let values = genes.iter().map(|gene| gene.value).collect::<Vec<_>>();
    let cutoff = quantile(&values, settings.quantile)
        .ok_or_else(|| SkcmError::NoData(gene_table.display().to_string()))?;
    tracing::info!(cutoff, quantile = settings.quantile, column = %value_column, "gene cutoff");

    let (rows, counts) = build_cohort(&outcomes, &genes, cutoff);
    if rows.is_empty() {
        return Err(SkcmError::NoData(format!(
            "{} after joining with the clinical table",
            settings.gene
        )));
    }

    let cohort_path = survival_dir.join(COHORT_FILE);
    write_tsv(
        &cohort_path,
        &[
            "bcr_patient_barcode".to_string(),
            DURATION_COL.to_string(),
            EVENT_COL.to_string(),
            STAGE_COLUMN.to_string(),
            settings.gene.clone(),
        ],
        &rows
            .iter()
            .map(|row| {
                vec![
                    row.barcode.clone(),
                    format_float(row.days),
                    row.vital_status.to_string(),
                    format_float(row.tumor_stage),
                    format_float(row.indicator),
                ]
            })
            .collect::<Vec<_>>(),
    )?;

    let data = cohort_data(&rows, &settings.gene)?;
    let fit = CoxModel::new()
        .with_penalizer(settings.penalizer)
        .fit(&data)?;
    let summary = fit.summary(DURATION_COL, EVENT_COL);

    let mut report = summary.render();
    report.push_str(&format!(
        "\ntime fit was run = {}\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    ));
    let summary_path = survival_dir.join(SUMMARY_FILE);
    write_atomic(&summary_path, report.as_bytes())?;
    tracing::info!(path = %summary_path.display(), "wrote Cox summary");

    Ok(SurvivalResult {
        gene: settings.gene.clone(),
        value_column,
        quantile: settings.quantile,
        cutoff,
        counts,
        observations: rows.len(),
        summary_path: summary_path.display().to_string(),
        cohort_path: cohort_path.display().to_string(),
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(barcode: &str, days: f64, vital_status: u8) -> SurvivalOutcome {
        SurvivalOutcome {
            barcode: barcode.to_string(),
            days,
            vital_status,
        }
    }

    fn gene(barcode: &str, value: f64, stage: &str) -> GeneExpression {
        GeneExpression {
            barcode: barcode.to_string(),
            value,
            tumor_stage: stage.to_string(),
        }
    }

    #[test]
    fn cohort_joins_in_outcome_order() {
        let outcomes = vec![
            outcome("A", 100.0, 0),
            outcome("B", 50.0, 1),
            outcome("C", 70.0, 1),
            outcome("D", 20.0, 1),
        ];
        let genes = vec![
            gene("C", 9.0, "Stage_III"),
            gene("A", 1.0, "Stage_I"),
            gene("B", 5.0, "_Not_Available_"),
            gene("A", 100.0, "Stage_IV"),
        ];
        let (rows, counts) = build_cohort(&outcomes, &genes, 5.0);
        assert_eq!(counts.joined, 3);
        assert_eq!(counts.dropped_stage, 1);
        assert_eq!(counts.duplicate_barcodes, 1);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].barcode, "A");
        assert_eq!(rows[0].tumor_stage, 1.0);
        assert_eq!(rows[0].indicator, 0.0);
        assert_eq!(rows[1].barcode, "C");
        assert_eq!(rows[1].indicator, 1.0);
    }

    #[test]
    fn cohort_matrix_has_stage_then_gene() {
        let rows = vec![
            CohortRow {
                barcode: "A".to_string(),
                days: 10.0,
                vital_status: 1,
                tumor_stage: 2.0,
                indicator: 1.0,
            },
            CohortRow {
                barcode: "B".to_string(),
                days: 20.0,
                vital_status: 0,
                tumor_stage: 3.0,
                indicator: 0.0,
            },
        ];
        let data = cohort_data(&rows, "BRD3OS").unwrap();
        assert_eq!(data.names(), &["tumor_stage".to_string(), "BRD3OS".to_string()]);
        assert_eq!(data.covariates()[[1, 0]], 3.0);
        assert_eq!(data.events(), &[true, false]);
    }
}
