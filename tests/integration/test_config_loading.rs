//! Settings files drive the splitter and default cluster requests.

use docatlas::Settings;
use docatlas::clustering::{Algorithm, ClusterRequest, Granularity, ReductionMethod};
use docatlas::documents::DocumentProcessor;
use docatlas::error::ClusterError;
use std::fs;
use tempfile::TempDir;

fn write_settings(content: &str) -> (TempDir, Settings) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.toml");
    fs::write(&path, content).unwrap();
    let settings = Settings::load_from(&path).unwrap();
    (temp_dir, settings)
}

#[test]
fn test_cluster_defaults_come_from_settings() {
    let (_dir, settings) = write_settings(
        r#"
[clustering]
algorithm = "density"
reduction_method = "umap"
level = "chunk"
min_cluster_size = 4
"#,
    );

    let request = ClusterRequest::from_config(&settings.clustering).unwrap();
    assert_eq!(request.algorithm, Algorithm::Hdbscan);
    assert_eq!(request.reduction_method, ReductionMethod::Umap);
    assert_eq!(request.level, Granularity::Chunk);
}

#[test]
fn test_unknown_algorithm_in_settings_is_rejected() {
    let (_dir, settings) = write_settings(
        r#"
[clustering]
algorithm = "spectral"
"#,
    );

    let err = ClusterRequest::from_config(&settings.clustering).unwrap_err();
    assert!(matches!(err, ClusterError::InvalidRequest { .. }));
    assert_eq!(err.status_code(), "INVALID_REQUEST");
}

#[test]
fn test_chunking_settings_reach_the_splitter() {
    let (_dir, settings) = write_settings(
        r#"
[chunking]
chunk_size = 9
chunk_overlap = 5
separators = [" "]
"#,
    );
    assert!(settings.chunking.validate().is_ok());

    let processor = DocumentProcessor::new(&settings.chunking);
    let chunks: Vec<String> = processor
        .chunk_text("AAAA BBBB CCCC DDDD")
        .into_iter()
        .map(|c| c.content)
        .collect();
    assert_eq!(chunks, vec!["AAAA BBBB", "BBBB CCCC", "CCCC DDDD"]);
}

#[test]
fn test_saved_settings_load_back() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join(".docatlas").join("settings.toml");

    let mut settings = Settings::default();
    settings.search.top_k = 9;
    settings.clustering.n_clusters = 3;
    settings.save(&path).unwrap();

    let loaded = Settings::load_from(&path).unwrap();
    assert_eq!(loaded.search.top_k, 9);
    assert_eq!(loaded.clustering.n_clusters, 3);
    assert_eq!(loaded.chunking, settings.chunking);
}
