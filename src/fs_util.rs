use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use regex::Regex;
use zip::ZipArchive;

use crate::error::SkcmError;

/// Creates `parent/name` unless it already exists and returns its path.
pub fn create_folder(name: &str, parent: &Path) -> Result<PathBuf, SkcmError> {
    let folder = parent.join(name);
    if folder.is_dir() {
        tracing::debug!(folder = %folder.display(), "folder already exists");
        return Ok(folder);
    }
    fs::create_dir_all(&folder)
        .map_err(|err| SkcmError::Filesystem(format!("create {}: {err}", folder.display())))?;
    tracing::info!(folder = %folder.display(), "created folder");
    Ok(folder)
}

/// Translates a shell glob (`*`, `?`) into an anchored regex over a single
/// path component.
pub fn glob_regex(pattern: &str) -> Result<Regex, SkcmError> {
    if pattern.is_empty() || pattern.contains('/') || pattern.contains('\\') {
        return Err(SkcmError::InvalidPattern(pattern.to_string()));
    }
    let mut expr = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str("[^/]*"),
            '?' => expr.push_str("[^/]"),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|err| SkcmError::InvalidPattern(format!("{pattern}: {err}")))
}

/// Regular files directly inside `folder` whose name matches any pattern.
pub fn search_target_files(patterns: &[&str], folder: &Path) -> Result<Vec<PathBuf>, SkcmError> {
    let regexes = patterns
        .iter()
        .map(|pattern| glob_regex(pattern))
        .collect::<Result<Vec<_>, _>>()?;
    let mut matches = Vec::new();
    for path in list_dir(folder)? {
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if regexes.iter().any(|re| re.is_match(name)) {
            matches.push(path);
        }
    }
    matches.sort();
    matches.dedup();
    Ok(matches)
}

/// Files reached from `root` by matching one glob per path level, e.g.
/// `["*", "*", "*.tsv"]` for `root/<stage>/<case>/<file>.tsv`.
pub fn glob_tree(root: &Path, segments: &[&str]) -> Result<Vec<PathBuf>, SkcmError> {
    let regexes = segments
        .iter()
        .map(|segment| glob_regex(segment))
        .collect::<Result<Vec<_>, _>>()?;
    let mut frontier = vec![root.to_path_buf()];
    for (depth, re) in regexes.iter().enumerate() {
        let last = depth + 1 == regexes.len();
        let mut next = Vec::new();
        for dir in &frontier {
            if !dir.is_dir() {
                continue;
            }
            for path in list_dir(dir)? {
                let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                    continue;
                };
                if !re.is_match(name) {
                    continue;
                }
                if (last && path.is_file()) || (!last && path.is_dir()) {
                    next.push(path);
                }
            }
        }
        frontier = next;
    }
    frontier.sort();
    Ok(frontier)
}

/// All regular files below `root`, skipping directories named in `skip`.
pub fn walk_files(root: &Path, skip: &[&Path]) -> Result<Vec<PathBuf>, SkcmError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for path in list_dir(&dir)? {
            if path.is_dir() {
                if !skip.iter().any(|skipped| *skipped == path.as_path()) {
                    stack.push(path);
                }
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, SkcmError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| SkcmError::Filesystem(format!("read dir {}: {err}", dir.display())))?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| SkcmError::Filesystem(err.to_string()))?;
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

/// Moves a file, falling back to copy + remove when a rename crosses devices.
pub fn move_file(from: &Path, to: &Path) -> Result<(), SkcmError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    }
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(|err| {
        SkcmError::Filesystem(format!(
            "move {} -> {}: {err}",
            from.display(),
            to.display()
        ))
    })?;
    fs::remove_file(from).map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Decompresses a gzip file next to `target` and removes the source.
pub fn gunzip_file(source: &Path, target: &Path) -> Result<(), SkcmError> {
    let input = fs::File::open(source)
        .map_err(|err| SkcmError::Filesystem(format!("open {}: {err}", source.display())))?;
    let parent = target
        .parent()
        .ok_or_else(|| SkcmError::Filesystem("invalid gunzip target".to_string()))?;
    fs::create_dir_all(parent).map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("skcm-gunzip")
        .tempfile_in(parent)
        .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    let mut decoder = GzDecoder::new(input);
    io::copy(&mut decoder, temp.as_file_mut()).map_err(|err| {
        SkcmError::Filesystem(format!("decompress {}: {err}", source.display()))
    })?;
    temp.persist(target)
        .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    fs::remove_file(source).map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Extracts every file of a zip archive flat into `target_dir` and returns the
/// extracted paths.
pub fn extract_zip_flat(zip_path: &Path, target_dir: &Path) -> Result<Vec<PathBuf>, SkcmError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| SkcmError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| SkcmError::Filesystem(err.to_string()))?;
    fs::create_dir_all(target_dir).map_err(|err| SkcmError::Filesystem(err.to_string()))?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let file_name = match entry.enclosed_name() {
            Some(path) => match path.file_name() {
                Some(name) => name.to_owned(),
                None => continue,
            },
            None => {
                return Err(SkcmError::Filesystem(
                    "zip entry path traversal detected".to_string(),
                ));
            }
        };
        let entry_path = target_dir.join(file_name);
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| SkcmError::Filesystem(err.to_string()))?;
        extracted.push(entry_path);
    }
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_whole_name() {
        let re = glob_regex("*.rna_seq.augmented_star_gene_counts*.tsv").unwrap();
        assert!(re.is_match("abc.rna_seq.augmented_star_gene_counts.tsv"));
        assert!(re.is_match("TCGA-EE-A2GJ.rna_seq.augmented_star_gene_counts.tsv"));
        assert!(!re.is_match("abc.rna_seq.augmented_star_gene_counts.tsv.gz"));
        assert!(!re.is_match("abcXrna_seq.augmented_star_gene_counts.tsv"));
    }

    #[test]
    fn glob_rejects_separators() {
        assert!(glob_regex("a/*.tsv").is_err());
        assert!(glob_regex("").is_err());
    }

    #[test]
    fn create_folder_is_idempotent() {
        let temp = tempfile::tempdir().unwrap();
        let first = create_folder("survival", temp.path()).unwrap();
        std::fs::write(first.join("keep.txt"), b"x").unwrap();
        let second = create_folder("survival", temp.path()).unwrap();
        assert_eq!(first, second);
        assert!(second.join("keep.txt").exists());
    }

    #[test]
    fn glob_tree_walks_levels() {
        let temp = tempfile::tempdir().unwrap();
        let case_dir = temp.path().join("Stage_I").join("TCGA-AA-0001");
        std::fs::create_dir_all(&case_dir).unwrap();
        std::fs::write(case_dir.join("TCGA-AA-0001.counts.tsv"), b"").unwrap();
        std::fs::write(case_dir.join("TCGA-AA-0001.maf"), b"").unwrap();
        std::fs::write(temp.path().join("Stage_I").join("stray.counts.tsv"), b"").unwrap();

        let found = glob_tree(temp.path(), &["*", "*", "*.counts.tsv"]).unwrap();
        assert_eq!(found, vec![case_dir.join("TCGA-AA-0001.counts.tsv")]);
    }
}
