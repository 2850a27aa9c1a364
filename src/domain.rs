use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SkcmError;
use crate::fs_util::glob_regex;

pub const NOT_AVAILABLE: &str = "[Not Available]";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmitterId(String);

impl SubmitterId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubmitterId {
    type Err = SkcmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && normalized != "."
            && normalized != ".."
            && !normalized.contains(['/', '\\']);
        if !is_valid {
            return Err(SkcmError::InvalidSubmitterId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct RenameRule {
    pattern: String,
    keep_from: usize,
    regex: Regex,
}

impl RenameRule {
    pub fn new(pattern: &str, keep_from: usize) -> Result<Self, SkcmError> {
        if keep_from == 0 {
            return Err(SkcmError::InvalidRenameRule(format!(
                "{pattern}: keep_from must be at least 1"
            )));
        }
        Ok(Self {
            pattern: pattern.to_string(),
            keep_from,
            regex: glob_regex(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn keep_from(&self) -> usize {
        self.keep_from
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    pub fn suffix(&self, file_name: &str) -> Option<String> {
        let parts = file_name.split('.').skip(self.keep_from).collect::<Vec<_>>();
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("."))
    }

    pub fn renamed(&self, file_name: &str, submitter: &SubmitterId) -> Option<String> {
        self.suffix(file_name)
            .map(|suffix| format!("{}.{suffix}", submitter.as_str()))
    }
}

impl PartialEq for RenameRule {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.keep_from == other.keep_from
    }
}

pub fn default_rename_rules() -> Vec<(String, usize)> {
    vec![
        ("*.wxs.aliquot_ensemble_masked.maf".to_string(), 1),
        ("*.rna_seq.augmented_star_gene_counts.tsv".to_string(), 1),
        ("*.mirbase21.isoforms.quantification.txt".to_string(), 1),
        ("*.mirbase21.mirnas.quantification.txt".to_string(), 1),
        ("*.gene_level_copy_number.v36.tsv".to_string(), 2),
    ]
}

pub fn replace_special_chars(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

pub fn stage_folder(stage: Option<&str>) -> String {
    match stage.map(str::trim) {
        Some(value) if !value.is_empty() && !is_missing(value) => replace_special_chars(value),
        _ => replace_special_chars(NOT_AVAILABLE),
    }
}

pub fn merge_stage(stage: &str) -> &str {
    match stage {
        "Stage_IA" | "Stage_IB" => "Stage_I",
        "Stage_IIA" | "Stage_IIB" | "Stage_IIC" => "Stage_II",
        "Stage_IIIA" | "Stage_IIIB" | "Stage_IIIC" => "Stage_III",
        other => other,
    }
}

pub fn stage_ordinal(stage: &str) -> Option<f64> {
    match stage {
        "Stage_0" => Some(0.0),
        "Stage_I" => Some(1.0),
        "Stage_II" => Some(2.0),
        "Stage_III" => Some(3.0),
        "Stage_IV" => Some(4.0),
        _ => None,
    }
}

/// Reduces a T/N/M value to its main category: `T3b` -> `T3`, `N1a` -> `N1`,
/// `Tis`, `TX` and `NX` stay as they are.
pub fn normalize_tnm(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() || is_missing(value) {
        return NOT_AVAILABLE.to_string();
    }
    let mut chars = value.chars();
    let Some(axis) = chars.next().filter(|ch| matches!(ch, 'T' | 'N' | 'M')) else {
        return value.to_string();
    };
    let rest = chars.as_str();
    if rest.starts_with("is") {
        return format!("{axis}is");
    }
    match rest.chars().next() {
        Some(ch) if ch == 'X' || ch.is_ascii_digit() => format!("{axis}{ch}"),
        _ => value.to_string(),
    }
}

pub fn is_missing(value: &str) -> bool {
    value.trim_start().starts_with('[')
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn special_chars_become_underscores() {
        assert_eq!(replace_special_chars("Stage IIIC"), "Stage_IIIC");
        assert_eq!(replace_special_chars("[Not Available]"), "_Not_Available_");
        assert_eq!(replace_special_chars("I/II NOS"), "I_II_NOS");
        assert_eq!(replace_special_chars("TCGA-SKCM"), "TCGA_SKCM");
    }

    #[test]
    fn rename_keeps_tail_after_first_dot() {
        let rule = RenameRule::new("*.rna_seq.augmented_star_gene_counts.tsv", 1).unwrap();
        let submitter: SubmitterId = "TCGA-EE-A2GJ".parse().unwrap();
        let name = "0c1a.rna_seq.augmented_star_gene_counts.tsv";
        assert!(rule.matches(name));
        assert_eq!(
            rule.renamed(name, &submitter).unwrap(),
            "TCGA-EE-A2GJ.rna_seq.augmented_star_gene_counts.tsv"
        );
    }

    #[test]
    fn rename_keeps_tail_after_second_dot() {
        let rule = RenameRule::new("*.gene_level_copy_number.v36.tsv", 2).unwrap();
        let submitter: SubmitterId = "TCGA-D3-A1Q1".parse().unwrap();
        let name = "TCGA-SKCM.8f3e.ascat3.gene_level_copy_number.v36.tsv";
        assert_eq!(
            rule.renamed(name, &submitter).unwrap(),
            "TCGA-D3-A1Q1.ascat3.gene_level_copy_number.v36.tsv"
        );
    }

    #[test]
    fn rename_rule_rejects_zero_keep_from() {
        assert_matches!(
            RenameRule::new("*.maf", 0),
            Err(SkcmError::InvalidRenameRule(_))
        );
    }

    #[test]
    fn submitter_id_rejects_paths() {
        assert_matches!(
            "../x".parse::<SubmitterId>(),
            Err(SkcmError::InvalidSubmitterId(_))
        );
        assert_matches!("  ".parse::<SubmitterId>(), Err(SkcmError::InvalidSubmitterId(_)));
    }

    #[test]
    fn stage_helpers() {
        assert_eq!(stage_folder(Some("Stage IIB")), "Stage_IIB");
        assert_eq!(stage_folder(Some("[Not Available]")), "_Not_Available_");
        assert_eq!(stage_folder(None), "_Not_Available_");
        assert_eq!(merge_stage("Stage_IIIC"), "Stage_III");
        assert_eq!(merge_stage("Stage_IV"), "Stage_IV");
        assert_eq!(stage_ordinal("Stage_III"), Some(3.0));
        assert_eq!(stage_ordinal("I_II_NOS"), None);
    }

    #[test]
    fn tnm_normalization() {
        assert_eq!(normalize_tnm("T3b"), "T3");
        assert_eq!(normalize_tnm("Tis"), "Tis");
        assert_eq!(normalize_tnm("NX"), "NX");
        assert_eq!(normalize_tnm("M1c"), "M1");
        assert_eq!(normalize_tnm("[Not Available]"), NOT_AVAILABLE);
    }
}
