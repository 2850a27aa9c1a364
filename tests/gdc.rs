use std::path::Path;

use assert_matches::assert_matches;

use tcga_skcm::error::SkcmError;
use tcga_skcm::gdc::{GDC_API, GdcHttpClient, read_manifest};

fn manifest(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("gdc_manifest.txt");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn manifest_rows_are_parsed() {
    let temp = tempfile::tempdir().unwrap();
    let path = manifest(
        temp.path(),
        "id\tfilename\tmd5\tsize\tstate\n\
0f5a\ta.wxs.aliquot_ensemble_masked.maf.gz\td41d8cd9\t1024\treleased\n\
77c1\tb.rna_seq.augmented_star_gene_counts.tsv\t\t\t\n",
    );
    let entries = read_manifest(&path).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].id, "0f5a");
    assert_eq!(entries[0].size, Some(1024));
    assert_eq!(entries[0].state.as_deref(), Some("released"));
    assert_eq!(entries[1].md5, None);
    assert_eq!(entries[1].size, None);
}

#[test]
fn manifest_errors() {
    let temp = tempfile::tempdir().unwrap();
    let no_id = manifest(temp.path(), "filename\tsize\na.maf\t1\n");
    assert_matches!(read_manifest(&no_id), Err(SkcmError::InvalidManifest(_)));

    let traversal = manifest(temp.path(), "id\tfilename\nx\t../a.maf\n");
    assert_matches!(read_manifest(&traversal), Err(SkcmError::InvalidManifest(_)));

    let bad_size = manifest(temp.path(), "id\tfilename\tsize\nx\ta.maf\tlots\n");
    assert_matches!(read_manifest(&bad_size), Err(SkcmError::InvalidManifest(_)));

    let empty = manifest(temp.path(), "id\tfilename\n");
    assert_matches!(read_manifest(&empty), Err(SkcmError::InvalidManifest(_)));

    assert_matches!(
        read_manifest(&temp.path().join("missing.txt")),
        Err(SkcmError::MissingInput(_))
    );
}

#[test]
fn data_endpoint_url() {
    let client = GdcHttpClient::new().unwrap();
    assert_eq!(client.data_url("0f5a"), format!("{GDC_API}/data/0f5a"));
}
