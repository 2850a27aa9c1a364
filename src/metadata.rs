use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::domain::SubmitterId;
use crate::error::SkcmError;

/// One entry of a GDC `files.*.json` export.
#[derive(Debug, Clone, Deserialize)]
pub struct FileRecord {
    pub file_name: String,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub cases: Vec<CaseRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseRef {
    pub case_id: String,
    #[serde(default)]
    pub submitter_id: Option<String>,
}

/// One entry of a GDC `cases.*.json` export.
#[derive(Debug, Clone, Deserialize)]
pub struct CaseRecord {
    pub case_id: String,
    pub submitter_id: String,
    #[serde(default)]
    pub diagnoses: Vec<Diagnosis>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Diagnosis {
    #[serde(default)]
    pub ajcc_pathologic_stage: Option<String>,
}

impl CaseRecord {
    pub fn pathologic_stage(&self) -> Option<&str> {
        self.diagnoses
            .iter()
            .find_map(|diagnosis| diagnosis.ajcc_pathologic_stage.as_deref())
    }
}

/// Reads a JSON array of records; an empty array is an error.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SkcmError> {
    if !path.exists() {
        return Err(SkcmError::MissingInput(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)
        .map_err(|err| SkcmError::Filesystem(format!("read {}: {err}", path.display())))?;
    let records: Vec<T> =
        serde_json::from_str(&content).map_err(|err| SkcmError::MetadataParse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    if records.is_empty() {
        return Err(SkcmError::EmptyMetadata(path.to_path_buf()));
    }
    Ok(records)
}

/// Resolved case of a downloaded file.
#[derive(Debug, Clone)]
pub struct CaseMatch<'a> {
    pub case_id: &'a str,
    pub submitter_id: SubmitterId,
    pub case: &'a CaseRecord,
}

/// `file_name -> case_id -> submitter_id` lookup over the two GDC exports.
/// The first record for a key wins.
#[derive(Debug)]
pub struct MetadataIndex {
    files: Vec<FileRecord>,
    cases: Vec<CaseRecord>,
    file_by_name: HashMap<String, usize>,
    case_by_id: HashMap<String, usize>,
}

impl MetadataIndex {
    pub fn load(files_json: &Path, cases_json: &Path) -> Result<Self, SkcmError> {
        let files = read_json::<FileRecord>(files_json)?;
        tracing::info!(count = files.len(), "loaded file records");
        let cases = read_json::<CaseRecord>(cases_json)?;
        tracing::info!(count = cases.len(), "loaded case records");
        Ok(Self::new(files, cases))
    }

    pub fn new(files: Vec<FileRecord>, cases: Vec<CaseRecord>) -> Self {
        let mut file_by_name = HashMap::new();
        for (idx, record) in files.iter().enumerate() {
            file_by_name.entry(record.file_name.clone()).or_insert(idx);
        }
        let mut case_by_id = HashMap::new();
        for (idx, record) in cases.iter().enumerate() {
            case_by_id.entry(record.case_id.clone()).or_insert(idx);
        }
        Self {
            files,
            cases,
            file_by_name,
            case_by_id,
        }
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    /// Looks up `file_name`, then `file_name.gz` for files that were
    /// decompressed after download.
    pub fn file(&self, file_name: &str) -> Option<&FileRecord> {
        self.file_by_name
            .get(file_name)
            .or_else(|| self.file_by_name.get(&format!("{file_name}.gz")))
            .map(|idx| &self.files[*idx])
    }

    pub fn case_id_for(&self, file_name: &str) -> Option<&str> {
        let record = self.file(file_name)?;
        if record.cases.len() > 1 {
            tracing::warn!(
                file = file_name,
                cases = record.cases.len(),
                "file is linked to more than one case, using the first"
            );
        }
        record.cases.first().map(|case| case.case_id.as_str())
    }

    pub fn case(&self, case_id: &str) -> Option<&CaseRecord> {
        self.case_by_id.get(case_id).map(|idx| &self.cases[*idx])
    }

    pub fn resolve(&self, file_name: &str) -> Option<CaseMatch<'_>> {
        let case_id = self.case_id_for(file_name)?;
        let case = self.case(case_id)?;
        let submitter_id = match case.submitter_id.parse::<SubmitterId>() {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(case_id, error = %err, "case has an unusable submitter id");
                return None;
            }
        };
        Some(CaseMatch {
            case_id,
            submitter_id,
            case,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> MetadataIndex {
        let files: Vec<FileRecord> = serde_json::from_str(
            r#"[
                {"file_name": "a.wxs.aliquot_ensemble_masked.maf.gz", "cases": [{"case_id": "c1"}]},
                {"file_name": "b.rna_seq.augmented_star_gene_counts.tsv", "cases": [{"case_id": "c2"}, {"case_id": "c1"}]},
                {"file_name": "b.rna_seq.augmented_star_gene_counts.tsv", "cases": [{"case_id": "c1"}]}
            ]"#,
        )
        .unwrap();
        let cases: Vec<CaseRecord> = serde_json::from_str(
            r#"[
                {"case_id": "c1", "submitter_id": "TCGA-AA-0001", "diagnoses": [{"ajcc_pathologic_stage": "Stage IIA"}]},
                {"case_id": "c2", "submitter_id": "TCGA-AA-0002"}
            ]"#,
        )
        .unwrap();
        MetadataIndex::new(files, cases)
    }

    #[test]
    fn resolves_decompressed_names() {
        let index = index();
        let found = index.resolve("a.wxs.aliquot_ensemble_masked.maf").unwrap();
        assert_eq!(found.submitter_id.as_str(), "TCGA-AA-0001");
        assert_eq!(found.case.pathologic_stage(), Some("Stage IIA"));
    }

    #[test]
    fn first_record_and_first_case_win() {
        let index = index();
        let found = index.resolve("b.rna_seq.augmented_star_gene_counts.tsv").unwrap();
        assert_eq!(found.case_id, "c2");
        assert_eq!(found.case.pathologic_stage(), None);
    }

    #[test]
    fn unknown_file_is_unresolved() {
        assert!(index().resolve("missing.tsv").is_none());
    }

    #[test]
    fn empty_json_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("files.json");
        std::fs::write(&path, "[]").unwrap();
        let err = read_json::<FileRecord>(&path).unwrap_err();
        assert!(matches!(err, SkcmError::EmptyMetadata(_)));
    }
}
