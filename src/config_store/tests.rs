//! Tests for the build configuration store.

use super::*;
use crate::config::{DEFAULT_BASE_IMAGE, DEFAULT_FLAVOR};
use crate::provision::ProvisioningPlan;
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct StoreFixture {
    _tmp: TempDir,
    root: Utf8PathBuf,
    store: BuildConfigStore,
}

#[fixture]
fn store_fixture() -> StoreFixture {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|err| panic!("temp path should be utf8: {}", err.display()));
    let store = BuildConfigStore::new(root.join("builds").join("config.json"));
    StoreFixture {
        _tmp: tmp,
        root,
        store,
    }
}

fn sample() -> BuildConfig {
    BuildConfig {
        region: String::from("CANADA-1"),
        image_name: String::from("kubernetes_gpu_cuda"),
        image_version: String::from("202508.15.0"),
        vm_name: String::from("thunder-build-vm"),
        keypair_name: String::from("build-key"),
        private_key_path: String::from("~/.ssh/id_rsa"),
        environment_name: String::from("default-CANADA-1"),
        ..BuildConfig::default()
    }
    .with_defaults()
}

#[rstest]
fn missing_file_does_not_exist(store_fixture: StoreFixture) {
    let exists = store_fixture
        .store
        .exists()
        .unwrap_or_else(|err| panic!("exists: {err}"));
    assert!(!exists);
}

#[rstest]
fn save_creates_parent_directory_and_round_trips(store_fixture: StoreFixture) {
    let StoreFixture { store, .. } = store_fixture;
    let config = sample();

    store
        .save(&config)
        .unwrap_or_else(|err| panic!("save: {err}"));

    assert!(store.exists().unwrap_or_else(|err| panic!("exists: {err}")));
    let loaded = store.load().unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(loaded, config);
}

#[rstest]
fn saved_file_is_pretty_json_without_provisioning_section(store_fixture: StoreFixture) {
    let StoreFixture { store, .. } = store_fixture;
    store
        .save(&sample())
        .unwrap_or_else(|err| panic!("save: {err}"));

    let contents = read_config(store.path()).unwrap_or_else(|err| panic!("read: {err}"));

    assert!(contents.contains("\n  \"image_name\": \"kubernetes_gpu_cuda\""));
    assert!(!contents.contains("provisioning"));
    assert!(contents.ends_with('\n'));
}

#[rstest]
fn load_applies_defaults_to_sparse_file(store_fixture: StoreFixture) {
    let StoreFixture { store, .. } = store_fixture;
    write_config(store.path(), r#"{"image_name": "img", "flavor_name": ""}"#)
        .unwrap_or_else(|err| panic!("seed: {err}"));

    let loaded = store.load().unwrap_or_else(|err| panic!("load: {err}"));

    assert_eq!(loaded.flavor_name, DEFAULT_FLAVOR);
    assert_eq!(loaded.base_image_name, DEFAULT_BASE_IMAGE);
    assert_eq!(loaded.tags, vec![String::from("k8s")]);
}

#[rstest]
fn load_rebases_relative_provisioning_directories(store_fixture: StoreFixture) {
    let StoreFixture { root, store, .. } = store_fixture;
    write_config(
        store.path(),
        r#"{"provisioning": {"scripts_dir": "scripts", "files_dir": "/srv/files"}}"#,
    )
    .unwrap_or_else(|err| panic!("seed: {err}"));

    let plan = store
        .load()
        .unwrap_or_else(|err| panic!("load: {err}"))
        .provisioning
        .unwrap_or_else(ProvisioningPlan::default);

    assert_eq!(plan.scripts_dir, root.join("builds").join("scripts"));
    assert_eq!(plan.files_dir, Utf8PathBuf::from("/srv/files"));
}

#[rstest]
fn load_reports_invalid_json_with_path(store_fixture: StoreFixture) {
    let StoreFixture { store, .. } = store_fixture;
    write_config(store.path(), "{not json").unwrap_or_else(|err| panic!("seed: {err}"));

    let err = store.load().expect_err("invalid JSON should fail");

    let ConfigStoreError::Parse { ref path, .. } = err else {
        panic!("expected Parse error, got {err:?}");
    };
    assert_eq!(path, store.path());
}

#[test]
fn path_without_file_name_is_rejected() {
    let err = BuildConfigStore::new("/")
        .load()
        .expect_err("root has no file name");
    assert!(matches!(err, ConfigStoreError::InvalidPath { .. }));
}
