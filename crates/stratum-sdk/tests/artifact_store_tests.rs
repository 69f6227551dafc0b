//! File-backed artifact store tests

use stratum_sdk::{ArtifactStore, FsArtifactStore};

#[test]
fn test_fs_store_writes_content_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path());

    store
        .write_artifact("core/demo/WidgetStub.rs", "pub struct WidgetStub;", "h1")
        .unwrap();

    let written = std::fs::read_to_string(dir.path().join("core/demo/WidgetStub.rs")).unwrap();
    assert_eq!(written, "pub struct WidgetStub;");
    assert_eq!(store.read_index("core/demo/WidgetStub.rs"), Some("h1".to_string()));
    assert!(dir.path().join("core").join(".stub-index.json").exists());
}

#[test]
fn test_fs_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FsArtifactStore::new(dir.path());
        store.write_artifact("app/A.rs", "a", "hash-a").unwrap();
        store.write_artifact("app/B.rs", "b", "hash-b").unwrap();
    }

    let reopened = FsArtifactStore::new(dir.path());
    assert_eq!(reopened.read_index("app/A.rs"), Some("hash-a".to_string()));
    assert_eq!(reopened.read_index("app/B.rs"), Some("hash-b".to_string()));
    assert_eq!(reopened.read_index("app/C.rs"), None);
}

#[test]
fn test_fs_indices_are_per_layer() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path());
    store.write_artifact("core/A.rs", "a", "core-hash").unwrap();
    store.write_artifact("app/A.rs", "a", "app-hash").unwrap();

    assert_eq!(store.read_index("core/A.rs"), Some("core-hash".to_string()));
    assert_eq!(store.read_index("app/A.rs"), Some("app-hash".to_string()));
}

#[test]
fn test_corrupt_index_is_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("core")).unwrap();
    std::fs::write(dir.path().join("core/.stub-index.json"), "not json").unwrap();

    let store = FsArtifactStore::new(dir.path());
    assert_eq!(store.read_index("core/A.rs"), None);
}
