use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{SubmitterId, replace_special_chars};
use crate::error::SkcmError;

pub const TEMP_FOLDER: &str = "temp_folder";
pub const CHECK_FOLDER: &str = "dupe_files_check";
pub const SURVIVAL_FOLDER: &str = "survival";

/// Output and download layout:
/// `<output>/<project>/<stage>/<submitter>/` for sorted files,
/// `<output>/<project>_analysis/<gene>/` for analysis results and
/// `<download>/<file_id>/<file_name>` for GDC downloads.
#[derive(Debug, Clone)]
pub struct Store {
    output_root: Utf8PathBuf,
    download_root: Utf8PathBuf,
    project: String,
}

impl Store {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new_with_paths(
            config.output_folder.clone(),
            config.download_folder.clone(),
            &config.project_name,
        )
    }

    pub fn new_with_paths(
        output_root: Utf8PathBuf,
        download_root: Utf8PathBuf,
        project: &str,
    ) -> Self {
        Self {
            output_root,
            download_root,
            project: replace_special_chars(project),
        }
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn download_root(&self) -> &Utf8Path {
        &self.download_root
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn project_dir(&self) -> Utf8PathBuf {
        self.output_root.join(&self.project)
    }

    pub fn stage_dir(&self, stage: &str) -> Utf8PathBuf {
        self.project_dir().join(stage)
    }

    pub fn case_dir(&self, stage: &str, submitter: &SubmitterId) -> Utf8PathBuf {
        self.stage_dir(stage).join(submitter.as_str())
    }

    pub fn sort_report_path(&self) -> Utf8PathBuf {
        self.project_dir().join("sort_report.json")
    }

    pub fn analysis_dir(&self) -> Utf8PathBuf {
        self.output_root.join(format!("{}_analysis", self.project))
    }

    pub fn gene_dir(&self, gene: &str) -> Utf8PathBuf {
        self.analysis_dir().join(replace_special_chars(gene))
    }

    pub fn survival_dir(&self, gene: &str) -> Utf8PathBuf {
        self.gene_dir(gene).join(SURVIVAL_FOLDER)
    }

    pub fn download_file_path(&self, file_id: &str, file_name: &str) -> Utf8PathBuf {
        self.download_root.join(file_id).join(file_name)
    }

    pub fn temp_dir(&self) -> Utf8PathBuf {
        self.download_root.join(TEMP_FOLDER)
    }

    pub fn check_dir(&self) -> Utf8PathBuf {
        self.download_root.join(CHECK_FOLDER)
    }

    pub fn ensure_dir(path: &Utf8Path) -> Result<(), SkcmError> {
        fs::create_dir_all(path.as_std_path())
            .map_err(|err| SkcmError::Filesystem(format!("create {path}: {err}")))
    }

    pub fn write_json<T: Serialize>(path: &Utf8Path, value: &T) -> Result<(), SkcmError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SkcmError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths(
            Utf8PathBuf::from("/out"),
            Utf8PathBuf::from("/dl"),
            "TCGA-SKCM",
        );
        let submitter: SubmitterId = "TCGA-EE-A2GJ".parse().unwrap();

        assert_eq!(store.project(), "TCGA_SKCM");
        assert_eq!(
            store.case_dir("Stage_IIIC", &submitter),
            Utf8PathBuf::from("/out/TCGA_SKCM/Stage_IIIC/TCGA-EE-A2GJ")
        );
        assert_eq!(
            store.survival_dir("BRD3OS"),
            Utf8PathBuf::from("/out/TCGA_SKCM_analysis/BRD3OS/survival")
        );
        assert_eq!(store.temp_dir(), Utf8PathBuf::from("/dl/temp_folder"));
        assert!(store.download_file_path("uuid", "x.maf.gz").ends_with("uuid/x.maf.gz"));
    }
}
