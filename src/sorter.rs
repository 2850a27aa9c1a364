use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::clinical::ClinicalTable;
use crate::domain::{RenameRule, stage_folder};
use crate::error::SkcmError;
use crate::fs_util::{extract_zip_flat, gunzip_file, move_file, search_target_files, walk_files};
use crate::metadata::{CaseMatch, MetadataIndex};
use crate::store::Store;

pub const ACTION_SORTED: &str = "sorted";
pub const ACTION_DUPLICATE: &str = "duplicate";
pub const ACTION_UNMATCHED: &str = "unmatched";
pub const ACTION_INVALID_NAME: &str = "invalid-name";

#[derive(Debug, Clone, Serialize)]
pub struct SortItem {
    pub file_name: String,
    pub action: String,
    pub submitter_id: Option<String>,
    pub stage: Option<String>,
    pub destination: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SortReport {
    pub project: String,
    pub generated_at: String,
    pub gathered: usize,
    pub items: Vec<SortItem>,
}

impl SortReport {
    pub fn count(&self, action: &str) -> usize {
        self.items.iter().filter(|item| item.action == action).count()
    }
}

fn wanted_name(file_name: &str, rules: &[RenameRule], decompress: bool) -> Option<(String, bool)> {
    if rules.iter().any(|rule| rule.matches(file_name)) {
        return Some((file_name.to_string(), false));
    }
    let stripped = file_name.strip_suffix(".gz")?;
    if !rules.iter().any(|rule| rule.matches(stripped)) {
        return None;
    }
    if decompress {
        Some((stripped.to_string(), true))
    } else {
        Some((file_name.to_string(), false))
    }
}

fn gather_file(
    path: &Path,
    temp_dir: &Path,
    rules: &[RenameRule],
    decompress: bool,
) -> Result<bool, SkcmError> {
    let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
        return Ok(false);
    };
    let Some((target_name, gunzip)) = wanted_name(file_name, rules, decompress) else {
        return Ok(false);
    };
    let target = temp_dir.join(&target_name);
    if target.exists() {
        tracing::warn!(file = %target_name, "already gathered, keeping the first copy");
        return Ok(false);
    }
    if gunzip {
        gunzip_file(path, &target)?;
    } else {
        move_file(path, &target)?;
    }
    tracing::debug!(file = %target_name, "gathered");
    Ok(true)
}

pub fn gather_downloads(
    source: &Path,
    temp_dir: &Path,
    skip: &[&Path],
    rules: &[RenameRule],
    decompress: bool,
) -> Result<usize, SkcmError> {
    if !source.is_dir() {
        return Err(SkcmError::MissingInput(source.to_path_buf()));
    }
    fs::create_dir_all(temp_dir).map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    let mut skipped = skip.to_vec();
    skipped.push(temp_dir);

    let mut gathered = 0;
    for path in walk_files(source, &skipped)? {
        if gather_file(&path, temp_dir, rules, decompress)? {
            gathered += 1;
        }
    }
    tracing::info!(gathered, source = %source.display(), "gathered downloaded files");
    Ok(gathered)
}

pub fn gather_archive(
    archive: &Path,
    temp_dir: &Path,
    rules: &[RenameRule],
    decompress: bool,
) -> Result<usize, SkcmError> {
    if !archive.is_file() {
        return Err(SkcmError::MissingInput(archive.to_path_buf()));
    }
    fs::create_dir_all(temp_dir).map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    let staging = tempfile::Builder::new()
        .prefix("skcm-archive")
        .tempdir_in(temp_dir)
        .map_err(|err| SkcmError::Filesystem(err.to_string()))?;

    let mut gathered = 0;
    for path in extract_zip_flat(archive, staging.path())? {
        if gather_file(&path, temp_dir, rules, decompress)? {
            gathered += 1;
        }
    }
    tracing::info!(gathered, archive = %archive.display(), "gathered archive files");
    Ok(gathered)
}

pub fn stage_for(case: &CaseMatch<'_>, clinical: Option<&ClinicalTable>) -> String {
    let submitter = case.submitter_id.as_str();
    let clinical_stage = clinical.and_then(|table| table.stage(submitter));
    stage_folder(clinical_stage.or_else(|| case.case.pathologic_stage()))
}

pub fn sort_temp_folder(
    store: &Store,
    temp_dir: &Path,
    index: &MetadataIndex,
    clinical: Option<&ClinicalTable>,
    rules: &[RenameRule],
) -> Result<Vec<SortItem>, SkcmError> {
    let mut seen = HashSet::<PathBuf>::new();
    let mut items = Vec::new();

    for rule in rules {
        let compressed = format!("{}.gz", rule.pattern());
        for path in search_target_files(&[rule.pattern(), compressed.as_str()], temp_dir)? {
            if !seen.insert(path.clone()) {
                continue;
            }
            let file_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();
            items.push(sort_one(store, &path, file_name, index, clinical, rule)?);
        }
    }
    Ok(items)
}

fn sort_one(
    store: &Store,
    path: &Path,
    file_name: String,
    index: &MetadataIndex,
    clinical: Option<&ClinicalTable>,
    rule: &RenameRule,
) -> Result<SortItem, SkcmError> {
    let Some(case) = index.resolve(&file_name) else {
        tracing::warn!(file = %file_name, "no case found in metadata, leaving in temp folder");
        return Ok(SortItem {
            file_name,
            action: ACTION_UNMATCHED.to_string(),
            submitter_id: None,
            stage: None,
            destination: None,
        });
    };
    let stage = stage_for(&case, clinical);
    let submitter = case.submitter_id.to_string();

    let Some(renamed) = rule.renamed(&file_name, &case.submitter_id) else {
        tracing::warn!(file = %file_name, "nothing left to keep after renaming");
        return Ok(SortItem {
            file_name,
            action: ACTION_INVALID_NAME.to_string(),
            submitter_id: Some(submitter),
            stage: Some(stage),
            destination: None,
        });
    };

    let destination = store.case_dir(&stage, &case.submitter_id).join(&renamed);
    if destination.as_std_path().exists() {
        tracing::warn!(
            file = %file_name,
            destination = %destination,
            "destination already exists, leaving in temp folder"
        );
        return Ok(SortItem {
            file_name,
            action: ACTION_DUPLICATE.to_string(),
            submitter_id: Some(submitter),
            stage: Some(stage),
            destination: Some(destination.to_string()),
        });
    }

    move_file(path, destination.as_std_path())?;
    tracing::info!(file = %file_name, destination = %destination, "sorted");
    Ok(SortItem {
        file_name,
        action: ACTION_SORTED.to_string(),
        submitter_id: Some(submitter),
        stage: Some(stage),
        destination: Some(destination.to_string()),
    })
}
