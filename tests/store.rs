use camino::Utf8PathBuf;

use tcga_skcm::domain::SubmitterId;
use tcga_skcm::store::Store;

#[test]
fn layout_paths() {
    let store = Store::new_with_paths(
        Utf8PathBuf::from("/results"),
        Utf8PathBuf::from("/downloads"),
        "TCGA_SKCM",
    );
    let submitter: SubmitterId = "TCGA-D3-A1Q1".parse().unwrap();

    assert_eq!(store.project_dir(), Utf8PathBuf::from("/results/TCGA_SKCM"));
    assert!(
        store
            .case_dir("_Not_Available_", &submitter)
            .ends_with("TCGA_SKCM/_Not_Available_/TCGA-D3-A1Q1")
    );
    assert_eq!(
        store.sort_report_path(),
        Utf8PathBuf::from("/results/TCGA_SKCM/sort_report.json")
    );
    assert_eq!(
        store.gene_dir("HLA-A"),
        Utf8PathBuf::from("/results/TCGA_SKCM_analysis/HLA_A")
    );
    assert_eq!(
        store.check_dir(),
        Utf8PathBuf::from("/downloads/dupe_files_check")
    );
}

#[test]
fn json_writes_create_parents() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("a/b/report.json")).unwrap();
    Store::write_json(&path, &serde_json::json!({"sorted": 2})).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.contains("\"sorted\": 2"));
    assert!(!path.with_extension("tmp").exists());
}
