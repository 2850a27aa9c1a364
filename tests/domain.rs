use assert_matches::assert_matches;

use tcga_skcm::domain::{
    RenameRule, SubmitterId, default_rename_rules, merge_stage, normalize_tnm, stage_folder,
    stage_ordinal,
};
use tcga_skcm::error::SkcmError;

#[test]
fn default_rules_rename_every_gdc_file_type() {
    let submitter: SubmitterId = "TCGA-EE-A2GJ".parse().unwrap();
    let names = [
        (
            "a1b2.wxs.aliquot_ensemble_masked.maf",
            "TCGA-EE-A2GJ.wxs.aliquot_ensemble_masked.maf",
        ),
        (
            "c3d4.rna_seq.augmented_star_gene_counts.tsv",
            "TCGA-EE-A2GJ.rna_seq.augmented_star_gene_counts.tsv",
        ),
        (
            "e5f6.mirbase21.isoforms.quantification.txt",
            "TCGA-EE-A2GJ.mirbase21.isoforms.quantification.txt",
        ),
        (
            "TCGA-SKCM.0a9f.ascat3.gene_level_copy_number.v36.tsv",
            "TCGA-EE-A2GJ.ascat3.gene_level_copy_number.v36.tsv",
        ),
    ];
    let rules = default_rename_rules()
        .into_iter()
        .map(|(pattern, keep_from)| RenameRule::new(&pattern, keep_from).unwrap())
        .collect::<Vec<_>>();

    for (original, expected) in names {
        let rule = rules.iter().find(|rule| rule.matches(original)).unwrap();
        assert_eq!(rule.renamed(original, &submitter).unwrap(), expected);
    }
}

#[test]
fn submitter_id_is_trimmed() {
    let id: SubmitterId = " TCGA-D3-A1Q1 ".parse().unwrap();
    assert_eq!(id.as_str(), "TCGA-D3-A1Q1");
    assert_matches!(
        "TCGA/D3".parse::<SubmitterId>(),
        Err(SkcmError::InvalidSubmitterId(_))
    );
}

#[test]
fn stages_map_to_folders_and_ordinals() {
    let folder = stage_folder(Some("Stage IIIB"));
    assert_eq!(folder, "Stage_IIIB");
    assert_eq!(stage_ordinal(merge_stage(&folder)), Some(3.0));
    assert_eq!(stage_folder(Some("I/II NOS")), "I_II_NOS");
    assert_eq!(stage_ordinal(merge_stage("Stage_0")), Some(0.0));
    assert_eq!(stage_ordinal(merge_stage("_Not_Available_")), None);
}

#[test]
fn tnm_values_keep_main_category() {
    assert_eq!(normalize_tnm("T4b"), "T4");
    assert_eq!(normalize_tnm("N3"), "N3");
    assert_eq!(normalize_tnm("TX"), "TX");
    assert_eq!(normalize_tnm("[Unknown]"), "[Not Available]");
}
