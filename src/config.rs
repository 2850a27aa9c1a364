use std::fs;
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{RenameRule, default_rename_rules};
use crate::error::SkcmError;

pub const CONFIG_FILE: &str = "skcm.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub output_folder: Option<String>,
    #[serde(default)]
    pub download_folder: Option<String>,
    #[serde(default)]
    pub files_json: Option<String>,
    #[serde(default)]
    pub cases_json: Option<String>,
    #[serde(default)]
    pub clinical_table: Option<String>,
    #[serde(default)]
    pub manifest: Option<String>,
    #[serde(default)]
    pub archive: Option<String>,
    #[serde(default)]
    pub decompress: Option<bool>,
    #[serde(default)]
    pub rename_rules: Option<Vec<RenameRuleEntry>>,
    #[serde(default)]
    pub expression: Option<ExpressionSection>,
    #[serde(default)]
    pub survival: Option<SurvivalSection>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RenameRuleEntry {
    Shorthand(String),
    Detailed(RenameRuleObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RenameRuleObject {
    pub pattern: String,
    #[serde(default)]
    pub keep_from: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ExpressionSection {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub compare_columns: Option<Vec<String>>,
    #[serde(default)]
    pub value_columns: Option<Vec<String>>,
    #[serde(default)]
    pub genes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SurvivalSection {
    #[serde(default)]
    pub gene: Option<String>,
    #[serde(default)]
    pub quantile: Option<f64>,
    #[serde(default)]
    pub penalizer: Option<f64>,
}

/// Gene-count search settings. The first entry of `compare_columns` and of
/// `value_columns` is the key column of the STAR file.
#[derive(Debug, Clone)]
pub struct ExpressionSettings {
    pub pattern: String,
    pub compare_columns: Vec<String>,
    pub value_columns: Vec<String>,
    pub genes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SurvivalSettings {
    pub gene: String,
    pub quantile: f64,
    pub penalizer: f64,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub project_name: String,
    pub output_folder: Utf8PathBuf,
    pub download_folder: Utf8PathBuf,
    pub files_json: Utf8PathBuf,
    pub cases_json: Utf8PathBuf,
    pub clinical_table: Utf8PathBuf,
    pub manifest: Utf8PathBuf,
    pub archive: Option<Utf8PathBuf>,
    pub decompress: bool,
    pub rename_rules: Vec<RenameRule>,
    pub expression: ExpressionSettings,
    pub survival: SurvivalSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, SkcmError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(SkcmError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| SkcmError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| SkcmError::ConfigParse(err.to_string()))?;

        let base_dir = config_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let base_dir = Utf8PathBuf::from_path_buf(base_dir)
            .map_err(|_| SkcmError::InvalidConfig("non-utf8 config location".to_string()))?;

        Self::resolve_config(config, &base_dir)
    }

    pub fn resolve_config(config: Config, base_dir: &Utf8Path) -> Result<ResolvedConfig, SkcmError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let resolve_path = |value: Option<String>, default: &str| {
            let value = value.unwrap_or_else(|| default.to_string());
            if let Some(home) = expand_home(&value) {
                return home;
            }
            let path = Utf8PathBuf::from(value);
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };

        let download_folder = resolve_path(config.download_folder, "data/downloads");

        let rename_rules = match config.rename_rules {
            Some(entries) => entries
                .into_iter()
                .map(|entry| match entry {
                    RenameRuleEntry::Shorthand(pattern) => RenameRule::new(&pattern, 1),
                    RenameRuleEntry::Detailed(obj) => {
                        RenameRule::new(&obj.pattern, obj.keep_from.unwrap_or(1))
                    }
                })
                .collect::<Result<Vec<_>, SkcmError>>()?,
            None => default_rename_rules()
                .into_iter()
                .map(|(pattern, keep_from)| RenameRule::new(&pattern, keep_from))
                .collect::<Result<Vec<_>, SkcmError>>()?,
        };

        let expression = config.expression.unwrap_or_default();
        let expression = ExpressionSettings {
            pattern: expression
                .pattern
                .unwrap_or_else(|| default_expression_pattern().to_string()),
            compare_columns: expression
                .compare_columns
                .unwrap_or_else(default_compare_columns),
            value_columns: expression.value_columns.unwrap_or_else(default_value_columns),
            genes: expression.genes.unwrap_or_else(default_genes),
        };
        if expression.compare_columns.len() < 2 {
            return Err(SkcmError::InvalidConfig(
                "expression.compare_columns needs a key column and a value column".to_string(),
            ));
        }
        if expression.value_columns.len() < 2 {
            return Err(SkcmError::InvalidConfig(
                "expression.value_columns needs a key column and at least one value column"
                    .to_string(),
            ));
        }
        if expression.genes.is_empty() {
            return Err(SkcmError::InvalidConfig(
                "expression.genes must not be empty".to_string(),
            ));
        }

        let survival = config.survival.unwrap_or_default();
        let survival = SurvivalSettings {
            gene: survival.gene.unwrap_or_else(|| "BRD3OS".to_string()),
            quantile: survival.quantile.unwrap_or(0.9),
            penalizer: survival.penalizer.unwrap_or(0.0),
        };
        validate_survival(&survival)?;

        Ok(ResolvedConfig {
            schema_version,
            project_name: config
                .project_name
                .unwrap_or_else(|| "TCGA_SKCM".to_string()),
            output_folder: resolve_path(config.output_folder, "analysis"),
            download_folder,
            files_json: resolve_path(config.files_json, "data/files.json"),
            cases_json: resolve_path(config.cases_json, "data/cases.json"),
            clinical_table: resolve_path(config.clinical_table, "data/clinical_patient_skcm.txt"),
            manifest: resolve_path(config.manifest, "data/gdc_manifest.txt"),
            archive: config.archive.map(|archive| resolve_path(Some(archive), "")),
            decompress: config.decompress.unwrap_or(true),
            rename_rules,
            expression,
            survival,
        })
    }

    /// The config written by `skcm init`.
    pub fn default_config() -> Config {
        Config {
            schema_version: Some(1),
            project_name: Some("TCGA_SKCM".to_string()),
            output_folder: Some("analysis".to_string()),
            download_folder: Some("data/downloads".to_string()),
            files_json: Some("data/files.json".to_string()),
            cases_json: Some("data/cases.json".to_string()),
            clinical_table: Some("data/clinical_patient_skcm.txt".to_string()),
            manifest: Some("data/gdc_manifest.txt".to_string()),
            archive: None,
            decompress: Some(true),
            rename_rules: Some(
                default_rename_rules()
                    .into_iter()
                    .map(|(pattern, keep_from)| {
                        if keep_from == 1 {
                            RenameRuleEntry::Shorthand(pattern)
                        } else {
                            RenameRuleEntry::Detailed(RenameRuleObject {
                                pattern,
                                keep_from: Some(keep_from),
                            })
                        }
                    })
                    .collect(),
            ),
            expression: Some(ExpressionSection {
                pattern: Some(default_expression_pattern().to_string()),
                compare_columns: Some(default_compare_columns()),
                value_columns: Some(default_value_columns()),
                genes: Some(default_genes()),
            }),
            survival: Some(SurvivalSection {
                gene: Some("BRD3OS".to_string()),
                quantile: Some(0.9),
                penalizer: Some(0.0),
            }),
        }
    }
}

pub fn validate_survival(settings: &SurvivalSettings) -> Result<(), SkcmError> {
    if !(0.0..=1.0).contains(&settings.quantile) {
        return Err(SkcmError::InvalidConfig(format!(
            "survival.quantile must be within [0, 1], got {}",
            settings.quantile
        )));
    }
    if !(settings.penalizer >= 0.0) {
        return Err(SkcmError::InvalidConfig(format!(
            "survival.penalizer must be non-negative, got {}",
            settings.penalizer
        )));
    }
    if settings.gene.trim().is_empty() {
        return Err(SkcmError::InvalidConfig(
            "survival.gene must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn expand_home(value: &str) -> Option<Utf8PathBuf> {
    let rest = value.strip_prefix("~/")?;
    let home = BaseDirs::new()?.home_dir().join(rest);
    Utf8PathBuf::from_path_buf(home).ok()
}

pub fn default_expression_pattern() -> &'static str {
    "*.rna_seq.augmented_star_gene_counts*.tsv"
}

pub fn default_compare_columns() -> Vec<String> {
    vec![
        "gene_id".to_string(),
        "unstranded".to_string(),
        "stranded_first".to_string(),
        "stranded_second".to_string(),
    ]
}

pub fn default_value_columns() -> Vec<String> {
    vec![
        "gene_name".to_string(),
        "tpm_unstranded".to_string(),
        "fpkm_unstranded".to_string(),
        "fpkm_uq_unstranded".to_string(),
    ]
}

pub fn default_genes() -> Vec<String> {
    vec![
        "MIR1270".to_string(),
        "BRD3OS".to_string(),
        "BRD3".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved =
            ConfigLoader::resolve_config(Config::default(), Utf8Path::new("/work")).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.project_name, "TCGA_SKCM");
        assert_eq!(resolved.output_folder, Utf8PathBuf::from("/work/analysis"));
        assert_eq!(
            resolved.download_folder,
            Utf8PathBuf::from("/work/data/downloads")
        );
        assert_eq!(resolved.rename_rules.len(), 5);
        assert_eq!(resolved.rename_rules[4].keep_from(), 2);
        assert_eq!(resolved.expression.genes, default_genes());
        assert!(resolved.decompress);
        assert!(resolved.archive.is_none());
    }

    #[test]
    fn home_relative_download_folder() {
        let config: Config =
            serde_json::from_str(r#"{"download_folder": "~/gdc/downloads"}"#).unwrap();
        let resolved = ConfigLoader::resolve_config(config, Utf8Path::new("/work")).unwrap();
        if let Some(dirs) = BaseDirs::new() {
            assert_eq!(
                resolved.download_folder.as_std_path(),
                dirs.home_dir().join("gdc/downloads")
            );
        }
    }

    #[test]
    fn shorthand_and_detailed_rules() {
        let config: Config = serde_json::from_str(
            r#"{
                "output_folder": "/data/out",
                "rename_rules": ["*.maf", {"pattern": "*.v36.tsv", "keep_from": 2}]
            }"#,
        )
        .unwrap();
        let resolved = ConfigLoader::resolve_config(config, Utf8Path::new("/work")).unwrap();
        assert_eq!(resolved.output_folder, Utf8PathBuf::from("/data/out"));
        assert_eq!(resolved.rename_rules[0].keep_from(), 1);
        assert_eq!(resolved.rename_rules[1].pattern(), "*.v36.tsv");
    }

    #[test]
    fn rejects_out_of_range_quantile() {
        let config: Config = serde_json::from_str(r#"{"survival": {"quantile": 1.5}}"#).unwrap();
        let err = ConfigLoader::resolve_config(config, Utf8Path::new(".")).unwrap_err();
        assert!(matches!(err, SkcmError::InvalidConfig(_)));
    }
}
