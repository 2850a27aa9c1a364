use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;

use crate::domain::normalize_tnm;
use crate::error::SkcmError;
use crate::table::{Table, TableOptions, parse_float};

pub const BARCODE_COLUMN: &str = "bcr_patient_barcode";
pub const VITAL_STATUS_COLUMN: &str = "vital_status";
pub const LAST_CONTACT_COLUMN: &str = "last_contact_days_to";
pub const DEATH_COLUMN: &str = "death_days_to";
pub const STAGE_COLUMN: &str = "ajcc_pathologic_tumor_stage";
pub const T_COLUMN: &str = "ajcc_tumor_pathologic_pt";
pub const N_COLUMN: &str = "ajcc_nodes_pathologic_pn";
pub const M_COLUMN: &str = "ajcc_metastasis_pathologic_pm";

/// Survival outcome of one patient: follow-up time and whether death was
/// observed (1) or the patient was censored alive (0).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SurvivalOutcome {
    pub barcode: String,
    pub days: f64,
    pub vital_status: u8,
}

/// Pathologic T/N/M reduced to the main category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tnm {
    pub t: String,
    pub n: String,
    pub m: String,
}

/// The TCGA clinical patient table. The two rows after the header are
/// column descriptors and are skipped.
#[derive(Debug)]
pub struct ClinicalTable {
    table: Table,
    barcode: usize,
    by_barcode: HashMap<String, usize>,
}

impl ClinicalTable {
    pub fn read(path: &Path) -> Result<Self, SkcmError> {
        let table = Table::read(
            path,
            &TableOptions {
                skip_after_header: 2,
                ..TableOptions::default()
            },
        )?;
        Self::from_table(table)
    }

    pub fn from_table(table: Table) -> Result<Self, SkcmError> {
        let barcode = table.column(BARCODE_COLUMN)?;
        let mut by_barcode = HashMap::new();
        for row in 0..table.len() {
            by_barcode
                .entry(table.cell(row, barcode).to_string())
                .or_insert(row);
        }
        tracing::debug!(patients = by_barcode.len(), "loaded clinical table");
        Ok(Self {
            table,
            barcode,
            by_barcode,
        })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn value(&self, barcode: &str, column: &str) -> Option<&str> {
        let row = *self.by_barcode.get(barcode)?;
        let column = self.table.column(column).ok()?;
        Some(self.table.cell(row, column))
    }

    /// Raw `ajcc_pathologic_tumor_stage` of a patient, bracketed values
    /// included.
    pub fn stage(&self, barcode: &str) -> Option<&str> {
        self.value(barcode, STAGE_COLUMN)
            .filter(|value| !value.is_empty())
    }

    pub fn tnm(&self, barcode: &str) -> Option<Tnm> {
        self.by_barcode.get(barcode)?;
        let axis = |column: &str| normalize_tnm(self.value(barcode, column).unwrap_or(""));
        Some(Tnm {
            t: axis(T_COLUMN),
            n: axis(N_COLUMN),
            m: axis(M_COLUMN),
        })
    }

    /// Alive patients (follow-up from the last contact) followed by dead
    /// patients (follow-up until death). Rows with a missing or non-numeric
    /// follow-up and rows with any other vital status are dropped.
    pub fn outcomes(&self) -> Result<Vec<SurvivalOutcome>, SkcmError> {
        let status = self.table.column(VITAL_STATUS_COLUMN)?;
        let last_contact = self.table.column(LAST_CONTACT_COLUMN)?;
        let death = self.table.column(DEATH_COLUMN)?;

        let mut alive = Vec::new();
        let mut dead = Vec::new();
        let mut dropped = 0usize;
        for row in 0..self.table.len() {
            let (days_column, vital_status, bucket) = match self.table.cell(row, status) {
                "Alive" => (last_contact, 0, &mut alive),
                "Dead" => (death, 1, &mut dead),
                _ => {
                    dropped += 1;
                    continue;
                }
            };
            let raw = self.table.cell(row, days_column);
            let Some(days) = parse_float(raw) else {
                dropped += 1;
                continue;
            };
            bucket.push(SurvivalOutcome {
                barcode: self.table.cell(row, self.barcode).to_string(),
                days,
                vital_status,
            });
        }
        if dropped > 0 {
            tracing::warn!(dropped, "clinical rows without a usable follow-up");
        }
        alive.extend(dead);
        Ok(alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLINICAL: &str = "bcr_patient_barcode\tvital_status\tlast_contact_days_to\tdeath_days_to\tajcc_pathologic_tumor_stage\tajcc_tumor_pathologic_pt\tajcc_nodes_pathologic_pn\tajcc_metastasis_pathologic_pm\n\
bcr_patient_barcode\tvital_status\tlast_contact_days_to\tdeath_days_to\tajcc_pathologic_tumor_stage\tajcc_tumor_pathologic_pt\tajcc_nodes_pathologic_pn\tajcc_metastasis_pathologic_pm\n\
CDE_ID:2003301\tCDE_ID:5\tCDE_ID:6\tCDE_ID:7\tCDE_ID:8\tCDE_ID:9\tCDE_ID:10\tCDE_ID:11\n\
TCGA-A1\tDead\t[Not Applicable]\t400\tStage IIIC\tT3b\tN2a\tM0\n\
TCGA-A2\tAlive\t1200\t[Not Applicable]\tStage IB\tT1a\tN0\tM0\n\
TCGA-A3\tAlive\t[Not Available]\t[Not Applicable]\t[Not Available]\tTX\tNX\tM1c\n\
TCGA-A4\t[Not Available]\t10\t20\tStage IV\tT4\tN3\tM1\n";

    fn table() -> ClinicalTable {
        let table = Table::from_reader(
            CLINICAL.as_bytes(),
            Path::new("clinical.txt"),
            &TableOptions {
                skip_after_header: 2,
                ..TableOptions::default()
            },
        )
        .unwrap();
        ClinicalTable::from_table(table).unwrap()
    }

    #[test]
    fn outcomes_put_alive_first_and_drop_missing() {
        let outcomes = table().outcomes().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].barcode, "TCGA-A2");
        assert_eq!(outcomes[0].vital_status, 0);
        assert_eq!(outcomes[0].days, 1200.0);
        assert_eq!(outcomes[1].barcode, "TCGA-A1");
        assert_eq!(outcomes[1].vital_status, 1);
        assert_eq!(outcomes[1].days, 400.0);
    }

    #[test]
    fn stage_and_tnm_lookup() {
        let clinical = table();
        assert_eq!(clinical.len(), 4);
        assert_eq!(clinical.stage("TCGA-A1"), Some("Stage IIIC"));
        assert_eq!(clinical.stage("TCGA-ZZ"), None);
        let tnm = clinical.tnm("TCGA-A3").unwrap();
        assert_eq!((tnm.t.as_str(), tnm.n.as_str(), tnm.m.as_str()), ("TX", "NX", "M1"));
        assert_eq!(clinical.tnm("TCGA-A1").unwrap().n, "N2");
    }
}
