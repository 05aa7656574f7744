//! 程序包与程序存储集成测试（本机文件系统）

mod common;
use common::{project, web_project};
use coputer_store::{
    bundle_dir, bundle_hash, unbundle, BundleError, ProgramStore, StoreConfig, StoreOutcome,
};

// ===== 打包 =====

#[test]
fn test_bundle_directory() {
    let dir = web_project();
    let bundle = bundle_dir(dir.path()).unwrap();
    let files = unbundle(&bundle).unwrap();

    let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["init.luau", "README.md", "lib/util.luau"]);
    assert_eq!(
        files[2].data,
        b"return { greet = function() return \"hi\" end }\n"
    );
}

#[test]
fn test_rebundle_is_identical() {
    let dir = web_project();
    let first = bundle_dir(dir.path()).unwrap();
    let second = bundle_dir(dir.path()).unwrap();
    assert_eq!(first, second);
    assert_eq!(bundle_hash(&first), bundle_hash(&second));
}

#[test]
fn test_bundle_directory_without_entrypoint() {
    let dir = project(&[("main.luau", "return 1")]);
    assert_eq!(bundle_dir(dir.path()).unwrap_err(), BundleError::MissingEntrypoint);
}

#[test]
fn test_nested_entrypoint_does_not_count() {
    let dir = project(&[("sub/init.luau", "return 1")]);
    assert_eq!(bundle_dir(dir.path()).unwrap_err(), BundleError::MissingEntrypoint);
}

#[test]
fn test_bundle_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let err = bundle_dir(dir.path().join("nope")).unwrap_err();
    assert!(matches!(err, BundleError::Read { .. }));
}

// ===== 存储 =====

#[test]
fn test_store_materialises_on_disk() {
    let src = web_project();
    let data = tempfile::tempdir().unwrap();
    let store = ProgramStore::open(StoreConfig::from_data_dir(data.path()));

    let bundle = bundle_dir(src.path()).unwrap();
    let (hash, outcome) = store.store("owner-pk", "hello", &bundle).unwrap();
    assert_eq!(outcome, StoreOutcome::Created);

    let program = data.path().join("programs").join(hex::encode(hash));
    assert!(program.join("init.luau").is_file());
    assert!(program.join("lib").join("util.luau").is_file());
    assert_eq!(
        std::fs::read(data.path().join("names/owner-pk/hello")).unwrap(),
        hash
    );
    assert_eq!(store.entry_path(&hash), program.join("init.luau"));
}

#[test]
fn test_store_twice_is_idempotent() {
    let src = web_project();
    let data = tempfile::tempdir().unwrap();
    let store = ProgramStore::open(StoreConfig::from_data_dir(data.path()));
    let bundle = bundle_dir(src.path()).unwrap();

    store.store("owner-pk", "hello", &bundle).unwrap();
    let (_, outcome) = store.store("owner-pk", "hello", &bundle).unwrap();
    assert_eq!(outcome, StoreOutcome::AlreadyExists);

    // 同一程序包换个名字
    let (_, outcome) = store.store("owner-pk", "alias", &bundle).unwrap();
    assert_eq!(outcome, StoreOutcome::Created);
    assert_eq!(store.names("owner-pk").unwrap(), vec!["alias", "hello"]);
    assert_eq!(std::fs::read_dir(data.path().join("programs")).unwrap().count(), 1);
}

#[test]
fn test_names_per_owner() {
    let data = tempfile::tempdir().unwrap();
    let store = ProgramStore::open(StoreConfig::from_data_dir(data.path()));
    let bundle = bundle_dir(web_project().path()).unwrap();

    store.store("alice", "b", &bundle).unwrap();
    store.store("alice", "a", &bundle).unwrap();
    store.store("bob", "c", &bundle).unwrap();

    assert_eq!(store.names("alice").unwrap(), vec!["a", "b"]);
    assert_eq!(store.names("bob").unwrap(), vec!["c"]);
    assert!(store.names("carol").unwrap().is_empty());
    assert_eq!(store.lookup("carol", "a").unwrap(), None);
}

#[test]
fn test_bundle_stored() {
    let data = tempfile::tempdir().unwrap();
    let store = ProgramStore::open(StoreConfig::from_data_dir(data.path()));
    let bundle = bundle_dir(web_project().path()).unwrap();
    let hex = hex::encode(bundle_hash(&bundle));

    assert!(!store.bundle_stored(&hex));
    store.materialise(&bundle).unwrap();
    assert!(store.bundle_stored(&hex));
}

#[test]
fn test_corrupt_bundle_is_rejected() {
    let data = tempfile::tempdir().unwrap();
    let store = ProgramStore::open(StoreConfig::from_data_dir(data.path()));

    let err = store.store("owner", "bad", &[0x10, 0x00]).unwrap_err();
    assert_eq!(err.to_string(), "bad bundle: file length exceeds bundle length");
    assert!(!data.path().join("programs").exists());
    assert!(!data.path().join("names").exists());
}
