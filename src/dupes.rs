use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::RenameRule;
use crate::error::SkcmError;
use crate::fs_util::{glob_tree, search_target_files};
use crate::metadata::MetadataIndex;
use crate::store::Store;

/// A leftover file paired with the already-sorted file of the same case.
#[derive(Debug, Clone, Serialize)]
pub struct DupePair {
    pub file_name: String,
    pub submitter_id: Option<String>,
    pub sorted_copy: Option<String>,
    pub leftover_copy: Option<String>,
    pub status: String,
}

/// Copies every rule-matching leftover in `temp_dir` into `check_dir` as
/// `<submitter>.2.<suffix>`, next to a copy of its sorted counterpart.
pub fn collect_duplicates(
    store: &Store,
    temp_dir: &Path,
    check_dir: &Path,
    index: &MetadataIndex,
    rules: &[RenameRule],
) -> Result<Vec<DupePair>, SkcmError> {
    if !temp_dir.is_dir() {
        return Err(SkcmError::MissingInput(temp_dir.to_path_buf()));
    }
    let project_dir = store.project_dir();
    let mut seen = HashSet::<PathBuf>::new();
    let mut pairs = Vec::new();

    for rule in rules {
        let compressed = format!("{}.gz", rule.pattern());
        for path in search_target_files(&[rule.pattern(), compressed.as_str()], temp_dir)? {
            if seen.insert(path.clone()) {
                pairs.push(check_one(&path, project_dir.as_std_path(), check_dir, index, rule)?);
            }
        }
    }
    Ok(pairs)
}

fn check_one(
    path: &Path,
    project_dir: &Path,
    check_dir: &Path,
    index: &MetadataIndex,
    rule: &RenameRule,
) -> Result<DupePair, SkcmError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let skipped = |file_name: String, submitter_id: Option<String>, status: &str| DupePair {
        file_name,
        submitter_id,
        sorted_copy: None,
        leftover_copy: None,
        status: status.to_string(),
    };

    let Some(case) = index.resolve(&file_name) else {
        tracing::warn!(file = %file_name, "no case found in metadata");
        return Ok(skipped(file_name, None, "unmatched"));
    };
    let submitter = case.submitter_id.as_str().to_string();
    let Some(suffix) = rule.suffix(&file_name) else {
        return Ok(skipped(file_name, Some(submitter), "invalid-name"));
    };
    let needle = format!("{submitter}.{suffix}");

    let candidates = glob_tree(project_dir, &["*", submitter.as_str(), "*"])?;
    let Some(sorted) = candidates.iter().find(|candidate| {
        candidate
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.contains(&needle))
    }) else {
        tracing::warn!(file = %file_name, submitter = %submitter, "no sorted counterpart");
        return Ok(skipped(file_name, Some(submitter), "no-counterpart"));
    };

    std::fs::create_dir_all(check_dir).map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    let sorted_name = sorted
        .file_name()
        .ok_or_else(|| SkcmError::Filesystem("sorted file without a name".to_string()))?;
    let sorted_copy = check_dir.join(sorted_name);
    let leftover_copy = check_dir.join(format!("{submitter}.2.{suffix}"));
    copy(sorted, &sorted_copy)?;
    copy(path, &leftover_copy)?;
    tracing::info!(file = %file_name, submitter = %submitter, "copied duplicate pair");

    Ok(DupePair {
        file_name,
        submitter_id: Some(submitter),
        sorted_copy: Some(sorted_copy.display().to_string()),
        leftover_copy: Some(leftover_copy.display().to_string()),
        status: "copied".to_string(),
    })
}

fn copy(from: &Path, to: &Path) -> Result<(), SkcmError> {
    std::fs::copy(from, to).map_err(|err| {
        SkcmError::Filesystem(format!("copy {} -> {}: {err}", from.display(), to.display()))
    })?;
    Ok(())
}
