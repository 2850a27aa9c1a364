use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use camino::Utf8Path;
use serde::Serialize;

use crate::clinical::ClinicalTable;
use crate::config::{ConfigLoader, ResolvedConfig, validate_survival};
use crate::domain::replace_special_chars;
use crate::dupes::{DupePair, collect_duplicates};
use crate::error::SkcmError;
use crate::expression::{GeneReport, analyze_gene, gene_search, resolve_duplicates};
use crate::fs_util::glob_tree;
use crate::gdc::{GdcClient, read_manifest};
use crate::metadata::MetadataIndex;
use crate::sorter::{
    ACTION_DUPLICATE, ACTION_INVALID_NAME, ACTION_SORTED, ACTION_UNMATCHED, SortReport,
    gather_archive, gather_downloads, sort_temp_folder,
};
use crate::store::Store;
use crate::survival::{SurvivalResult, run_survival};

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub force: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitResult {
    pub path: String,
    pub overwritten: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub manifest: String,
    pub items: Vec<DownloadItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadItem {
    pub id: String,
    pub file_name: String,
    pub action: String,
    pub path: String,
    pub bytes: Option<u64>,
}

impl DownloadResult {
    pub fn count(&self, action: &str) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SortResult {
    pub report_path: String,
    pub sorted: usize,
    pub duplicates: usize,
    pub unmatched: usize,
    pub invalid_names: usize,
    pub report: SortReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct DupesResult {
    pub check_dir: String,
    pub pairs: Vec<DupePair>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenesResult {
    pub pattern: String,
    pub files: usize,
    pub removed: Vec<String>,
    pub genes: Vec<GeneReport>,
}

#[derive(Debug, Clone, Copy)]
pub enum ProgressSinkKind {
    Download,
    Sort,
    Dupes,
    Genes,
    Survival,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn progress(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
    });
}

#[derive(Clone)]
pub struct App<G: GdcClient> {
    store: Store,
    gdc: G,
}

impl<G: GdcClient> App<G> {
    pub fn new(store: Store, gdc: G) -> Self {
        Self { store, gdc }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Writes the default `skcm.json` to `path`.
    pub fn init_config(
        path: &Utf8Path,
        force: bool,
        sink: &dyn ProgressSink,
    ) -> Result<InitResult, SkcmError> {
        progress(sink, format!("phase=Resolve; checking {path}"));
        let exists = path.as_std_path().exists();
        if exists && !force {
            return Err(SkcmError::ConfigExists(path.as_std_path().to_path_buf()));
        }
        progress(sink, "phase=Store; writing config");
        Store::write_json(path, &ConfigLoader::default_config())?;
        tracing::info!(path = %path, "wrote default config");
        Ok(InitResult {
            path: path.to_string(),
            overwritten: exists,
        })
    }

    /// Fetches every manifest entry into `<download>/<id>/<filename>`.
    pub fn download(
        &self,
        config: &ResolvedConfig,
        options: DownloadOptions,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, SkcmError> {
        progress(sink, format!("phase=Resolve; reading manifest {}", config.manifest));
        let entries = read_manifest(config.manifest.as_std_path())?;
        tracing::info!(entries = entries.len(), "manifest entries");

        let mut items = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            progress(
                sink,
                format!(
                    "phase=Prepare; {} ({}/{})",
                    entry.filename,
                    index + 1,
                    entries.len()
                ),
            );
            let path = self.store.download_file_path(&entry.id, &entry.filename);
            let existing = std::fs::metadata(path.as_std_path())
                .ok()
                .filter(|meta| meta.is_file())
                .map(|meta| meta.len());
            let complete = match (existing, entry.size) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            };

            let item = |action: &str, bytes: Option<u64>| DownloadItem {
                id: entry.id.clone(),
                file_name: entry.filename.clone(),
                action: action.to_string(),
                path: path.to_string(),
                bytes,
            };

            if complete && !options.force {
                tracing::debug!(file = %entry.filename, "already downloaded");
                items.push(item("skipped", existing));
                continue;
            }
            if options.dry_run {
                items.push(item("planned", entry.size));
                continue;
            }

            let folder = path
                .parent()
                .ok_or_else(|| SkcmError::Filesystem(format!("no parent folder for {path}")))?;
            Store::ensure_dir(folder)?;
            let temp = tempfile::Builder::new()
                .prefix(".skcm-download")
                .tempfile_in(folder.as_std_path())
                .map_err(|err| SkcmError::Filesystem(err.to_string()))?;

            progress(sink, "gdc.request");
            let start = Instant::now();
            let bytes = self.gdc.download_file(&entry.id, temp.path())?;
            let latency = start.elapsed().as_millis();
            progress(sink, format!("gdc.response latency_ms={latency}"));

            progress(sink, format!("phase=Verify; {}", entry.filename));
            if let Some(expected) = entry.size {
                if expected != bytes {
                    return Err(SkcmError::SizeMismatch {
                        file: entry.filename.clone(),
                        expected,
                        actual: bytes,
                    });
                }
            }
            temp.persist(path.as_std_path())
                .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
            tracing::info!(file = %entry.filename, bytes, "downloaded");
            items.push(item("downloaded", Some(bytes)));
        }

        Ok(DownloadResult {
            manifest: config.manifest.to_string(),
            items,
        })
    }

    /// Gathers downloaded files into the temp folder and moves them into
    /// `<project>/<stage>/<submitter>/` under their new names.
    pub fn sort(
        &self,
        config: &ResolvedConfig,
        sink: &dyn ProgressSink,
    ) -> Result<SortResult, SkcmError> {
        progress(sink, "phase=Resolve; loading files and cases metadata");
        let index = MetadataIndex::load(
            config.files_json.as_std_path(),
            config.cases_json.as_std_path(),
        )?;
        progress(
            sink,
            format!(
                "phase=Resolve; {} file records, {} case records",
                index.file_count(),
                index.case_count()
            ),
        );
        let clinical = optional_clinical(config)?;

        let temp_dir = self.store.temp_dir();
        progress(sink, format!("phase=Prepare; gathering into {temp_dir}"));
        let gathered = match &config.archive {
            Some(archive) => gather_archive(
                archive.as_std_path(),
                temp_dir.as_std_path(),
                &config.rename_rules,
                config.decompress,
            )?,
            None => {
                let check_dir = self.store.check_dir();
                let project_dir = self.store.project_dir();
                gather_downloads(
                    self.store.download_root().as_std_path(),
                    temp_dir.as_std_path(),
                    &[check_dir.as_std_path(), project_dir.as_std_path()],
                    &config.rename_rules,
                    config.decompress,
                )?
            }
        };

        progress(sink, "phase=Process; renaming and sorting");
        Store::ensure_dir(&self.store.project_dir())?;
        let items = sort_temp_folder(
            &self.store,
            temp_dir.as_std_path(),
            &index,
            clinical.as_ref(),
            &config.rename_rules,
        )?;

        let report = SortReport {
            project: self.store.project().to_string(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            gathered,
            items,
        };
        progress(sink, "phase=Store; writing sort report");
        let report_path = self.store.sort_report_path();
        Store::write_json(&report_path, &report)?;

        Ok(SortResult {
            report_path: report_path.to_string(),
            sorted: report.count(ACTION_SORTED),
            duplicates: report.count(ACTION_DUPLICATE),
            unmatched: report.count(ACTION_UNMATCHED),
            invalid_names: report.count(ACTION_INVALID_NAME),
            report,
        })
    }

    /// Pairs the files left in the temp folder with their sorted copies.
    pub fn dupes(
        &self,
        config: &ResolvedConfig,
        sink: &dyn ProgressSink,
    ) -> Result<DupesResult, SkcmError> {
        progress(sink, "phase=Resolve; loading files and cases metadata");
        let index = MetadataIndex::load(
            config.files_json.as_std_path(),
            config.cases_json.as_std_path(),
        )?;
        let check_dir = self.store.check_dir();
        progress(sink, format!("phase=Process; copying pairs into {check_dir}"));
        let pairs = collect_duplicates(
            &self.store,
            self.store.temp_dir().as_std_path(),
            check_dir.as_std_path(),
            &index,
            &config.rename_rules,
        )?;
        Ok(DupesResult {
            check_dir: check_dir.to_string(),
            pairs,
        })
    }

    /// Gene search over the sorted count files with per-stage statistics.
    /// `genes` overrides the configured target genes when not empty.
    pub fn genes(
        &self,
        config: &ResolvedConfig,
        genes: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<GenesResult, SkcmError> {
        let settings = &config.expression;
        let requested = if genes.is_empty() {
            settings.genes.as_slice()
        } else {
            genes
        };
        let mut seen = HashSet::new();
        let genes = requested
            .iter()
            .filter(|gene| seen.insert(gene.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        let project_dir = self.store.project_dir();
        if !project_dir.as_std_path().is_dir() {
            return Err(SkcmError::MissingInput(project_dir.into_std_path_buf()));
        }

        progress(sink, format!("phase=Resolve; searching {}", settings.pattern));
        let files = glob_tree(
            project_dir.as_std_path(),
            &["*", "*", settings.pattern.as_str()],
        )?;
        tracing::info!(files = files.len(), "count files found");
        let resolution = resolve_duplicates(files, &settings.compare_columns)?;
        let clinical = optional_clinical(config)?;

        progress(sink, "phase=Process; collecting gene rows");
        let tables = gene_search(&resolution.kept, &genes, &settings.value_columns)?;

        let mut reports = Vec::with_capacity(tables.len());
        for table in &tables {
            progress(sink, format!("phase=Store; writing results for {}", table.gene));
            let gene_dir = self.store.gene_dir(&table.gene);
            Store::ensure_dir(&self.store.analysis_dir())?;
            reports.push(analyze_gene(
                gene_dir.as_std_path(),
                table,
                &resolution,
                settings,
                clinical.as_ref(),
            )?);
        }

        Ok(GenesResult {
            pattern: settings.pattern.clone(),
            files: resolution.kept.len(),
            removed: resolution
                .removed
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
            genes: reports,
        })
    }

    /// Cox model for one gene from `merge_<gene>.txt` and the clinical table.
    pub fn survival(
        &self,
        config: &ResolvedConfig,
        gene: Option<String>,
        quantile: Option<f64>,
        sink: &dyn ProgressSink,
    ) -> Result<SurvivalResult, SkcmError> {
        let mut settings = config.survival.clone();
        if let Some(gene) = gene {
            settings.gene = gene;
        }
        if let Some(quantile) = quantile {
            settings.quantile = quantile;
        }
        validate_survival(&settings)?;

        let gene_dir = self.store.gene_dir(&settings.gene);
        let gene_table = gene_dir.join(format!("merge_{}.txt", replace_special_chars(&settings.gene)));
        if !gene_table.as_std_path().is_file() {
            return Err(SkcmError::MissingInput(gene_table.into_std_path_buf()));
        }

        progress(sink, format!("phase=Resolve; reading {}", config.clinical_table));
        let clinical = ClinicalTable::read(config.clinical_table.as_std_path())?;

        progress(sink, format!("phase=Process; fitting Cox model for {}", settings.gene));
        let result = run_survival(
            gene_dir.as_std_path(),
            gene_table.as_std_path(),
            &clinical,
            &settings,
        )?;
        progress(sink, format!("phase=Store; wrote {}", result.summary_path));
        Ok(result)
    }
}

fn optional_clinical(config: &ResolvedConfig) -> Result<Option<ClinicalTable>, SkcmError> {
    let path: &Path = config.clinical_table.as_std_path();
    if !path.is_file() {
        tracing::warn!(path = %path.display(), "clinical table not found, using case metadata only");
        return Ok(None);
    }
    ClinicalTable::read(path).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::JsonOutput;
    use camino::Utf8PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockGdc {
        payload: Vec<u8>,
        calls: Mutex<usize>,
    }

    impl GdcClient for MockGdc {
        fn download_file(&self, _file_id: &str, destination: &Path) -> Result<u64, SkcmError> {
            *self.calls.lock().unwrap() += 1;
            std::fs::write(destination, &self.payload).unwrap();
            Ok(self.payload.len() as u64)
        }
    }

    fn setup(temp: &Path, manifest: &str) -> (Store, ResolvedConfig) {
        let base = Utf8PathBuf::from_path_buf(temp.to_path_buf()).unwrap();
        std::fs::create_dir_all(base.join("data")).unwrap();
        std::fs::write(base.join("data/gdc_manifest.txt"), manifest).unwrap();
        let config = ConfigLoader::resolve_config(
            serde_json::from_str(r#"{"download_folder": "data/downloads"}"#).unwrap(),
            &base,
        )
        .unwrap();
        (Store::from_config(&config), config)
    }

    #[test]
    fn download_skips_complete_files() {
        let temp = tempfile::tempdir().unwrap();
        let (store, config) = setup(
            temp.path(),
            "id\tfilename\tmd5\tsize\tstate\nf1\ta.maf.gz\tx\t4\treleased\n",
        );
        let app = App::new(
            store.clone(),
            MockGdc {
                payload: b"data".to_vec(),
                ..MockGdc::default()
            },
        );
        let options = DownloadOptions {
            force: false,
            dry_run: false,
        };

        let first = app.download(&config, options.clone(), &JsonOutput).unwrap();
        assert_eq!(first.items[0].action, "downloaded");
        let path = store.download_file_path("f1", "a.maf.gz");
        assert_eq!(std::fs::read(path.as_std_path()).unwrap(), b"data");

        let second = app.download(&config, options, &JsonOutput).unwrap();
        assert_eq!(second.items[0].action, "skipped");
        assert_eq!(*app.gdc.calls.lock().unwrap(), 1);
    }

    #[test]
    fn download_rejects_size_mismatch() {
        let temp = tempfile::tempdir().unwrap();
        let (store, config) = setup(
            temp.path(),
            "id\tfilename\tmd5\tsize\tstate\nf1\ta.maf.gz\tx\t10\treleased\n",
        );
        let app = App::new(
            store.clone(),
            MockGdc {
                payload: b"data".to_vec(),
                ..MockGdc::default()
            },
        );
        let err = app
            .download(
                &config,
                DownloadOptions {
                    force: false,
                    dry_run: false,
                },
                &JsonOutput,
            )
            .unwrap_err();
        assert!(matches!(err, SkcmError::SizeMismatch { expected: 10, actual: 4, .. }));
        assert!(!store.download_file_path("f1", "a.maf.gz").as_std_path().exists());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let (store, config) = setup(temp.path(), "id\tfilename\nf1\ta.maf.gz\n");
        let app = App::new(store.clone(), MockGdc::default());
        let result = app
            .download(
                &config,
                DownloadOptions {
                    force: false,
                    dry_run: true,
                },
                &JsonOutput,
            )
            .unwrap();
        assert_eq!(result.count("planned"), 1);
        assert_eq!(*app.gdc.calls.lock().unwrap(), 0);
        assert!(!store.download_root().as_std_path().exists());
    }
}
