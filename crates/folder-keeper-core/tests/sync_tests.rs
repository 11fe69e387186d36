use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

use folder_keeper_core::engine::FolderLocks;
use folder_keeper_core::hasher;
use folder_keeper_core::scanner;
use folder_keeper_core::storage::{
    Catalog, Database, FolderRegistry, InventoryStore, MemoryStore,
};
use folder_keeper_core::{AppConfig, Error, Keeper, SilentReporter, SyncEngine, SyncPhase};

fn write(root: &Path, route: &str, contents: &str) {
    let path = root.join(route);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn test_config(tmp: &Path, global: &[&str]) -> AppConfig {
    AppConfig {
        database_path: ":memory:".to_string(),
        global_exclude_patterns: global.iter().map(|p| p.to_string()).collect(),
        archive_dir: tmp.join("archive").to_string_lossy().into_owned(),
        trash_dir: tmp.join("trash").to_string_lossy().into_owned(),
    }
}

fn setup(global: &[&str]) -> (TempDir, Keeper<Database>) {
    let tmp = tempdir().unwrap();
    let config = test_config(tmp.path(), global);
    let keeper = Keeper::new(
        Arc::new(Database::open_in_memory().unwrap()),
        Arc::new(config),
    );
    (tmp, keeper)
}

/// Layout:
///   project/
///     README.md
///     src/lib.rs
///     src/util/mod.rs
///     .git/HEAD          (excluded by the default global patterns)
fn create_project(root: &Path) -> PathBuf {
    let project = root.join("project");
    write(&project, "README.md", "# project\n");
    write(&project, "src/lib.rs", "pub mod util;\n");
    write(&project, "src/util/mod.rs", "pub fn helper() {}\n");
    write(&project, ".git/HEAD", "ref: refs/heads/main\n");
    project
}

#[test]
fn test_sync_summary_matches_scan() {
    let (tmp, keeper) = setup(&[".git", "node_modules"]);
    let project = create_project(tmp.path());
    let folder = keeper.add_folder(&project).unwrap();

    let report = keeper.sync(folder.id, &SilentReporter).unwrap();

    let scanned = scanner::scan(&project, &[".git", "node_modules"]).unwrap();
    assert_eq!(report.folder.file_count, Some(scanned.files.len() as u64));
    assert_eq!(report.folder.total_bytes, Some(scanned.total_bytes()));
    assert_eq!(report.inserted, 3);
    assert_eq!(report.mutation_count(), 3);

    let items = keeper.list_files(folder.id).unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.relative_route != ".git/HEAD"));

    let expected = hasher::aggregate_checksum(
        items
            .iter()
            .map(|i| (i.relative_route.as_str(), i.content_checksum.as_str())),
    );
    let stored = keeper.get_folder(folder.id).unwrap();
    assert_eq!(stored.aggregate_checksum, Some(expected));
    assert!(stored.last_sync_time.is_some());
    assert_eq!(keeper.phase(folder.id), SyncPhase::Idle);
}

#[test]
fn test_item_checksums_are_content_sha256() {
    let (tmp, keeper) = setup(&[]);
    let root = tmp.path().join("one");
    write(&root, "abc.txt", "abc");
    let folder = keeper.add_folder(&root).unwrap();

    keeper.sync(folder.id, &SilentReporter).unwrap();

    let items = keeper.list_files(folder.id).unwrap();
    assert_eq!(
        items[0].content_checksum,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert_eq!(items[0].size_bytes, 3);
}

#[test]
fn test_second_sync_without_changes_is_a_no_op() {
    let (tmp, keeper) = setup(&[".git"]);
    let project = create_project(tmp.path());
    let folder = keeper.add_folder(&project).unwrap();

    let first = keeper.sync(folder.id, &SilentReporter).unwrap();
    let items_before = keeper.list_files(folder.id).unwrap();

    let second = keeper.sync(folder.id, &SilentReporter).unwrap();
    let items_after = keeper.list_files(folder.id).unwrap();

    assert_eq!(second.mutation_count(), 0);
    assert_eq!(second.unchanged, 3);
    assert_eq!(
        first.folder.aggregate_checksum,
        second.folder.aggregate_checksum
    );
    // Untouched rows keep their timestamps.
    let stamps = |items: &[folder_keeper_core::storage::FileItem]| {
        items
            .iter()
            .map(|i| (i.id, i.last_sync_time.timestamp_micros()))
            .collect::<Vec<_>>()
    };
    assert_eq!(stamps(&items_before), stamps(&items_after));
}

#[test]
fn test_sync_tracks_added_modified_and_removed_files() {
    let (tmp, keeper) = setup(&[".git"]);
    let project = create_project(tmp.path());
    let folder = keeper.add_folder(&project).unwrap();
    let first = keeper.sync(folder.id, &SilentReporter).unwrap();

    write(&project, "src/lib.rs", "pub mod util;\npub mod extra;\n");
    write(&project, "src/extra.rs", "// extra\n");
    fs::remove_file(project.join("README.md")).unwrap();

    let report = keeper.sync(folder.id, &SilentReporter).unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.unchanged, 1);
    assert_ne!(
        first.folder.aggregate_checksum,
        report.folder.aggregate_checksum
    );

    let routes: Vec<String> = keeper
        .list_files(folder.id)
        .unwrap()
        .into_iter()
        .map(|i| i.relative_route)
        .collect();
    assert_eq!(routes, vec!["src/extra.rs", "src/lib.rs", "src/util/mod.rs"]);
    assert_eq!(report.folder.file_count, Some(3));
}

#[test]
fn test_newly_excluded_files_leave_the_inventory() {
    let (tmp, keeper) = setup(&[".git"]);
    let project = create_project(tmp.path());
    let folder = keeper.add_folder(&project).unwrap();
    keeper.sync(folder.id, &SilentReporter).unwrap();

    keeper
        .set_exclude_patterns(folder.id, vec!["src".to_string()])
        .unwrap();
    let report = keeper.sync(folder.id, &SilentReporter).unwrap();

    assert_eq!(report.removed, 2);
    let routes: Vec<String> = keeper
        .list_files(folder.id)
        .unwrap()
        .into_iter()
        .map(|i| i.relative_route)
        .collect();
    assert_eq!(routes, vec!["README.md"]);
}

#[test]
fn test_invalid_folder_pattern_is_rejected() {
    let (tmp, keeper) = setup(&[]);
    let project = create_project(tmp.path());
    let folder = keeper.add_folder(&project).unwrap();

    let err = keeper
        .set_exclude_patterns(folder.id, vec!["[oops".to_string()])
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(keeper.get_folder(folder.id).unwrap().exclude_patterns.is_empty());
}

#[test]
fn test_missing_root_fails_and_keeps_previous_state() {
    let (tmp, keeper) = setup(&[".git"]);
    let project = create_project(tmp.path());
    let folder = keeper.add_folder(&project).unwrap();
    let first = keeper.sync(folder.id, &SilentReporter).unwrap();

    let moved = tmp.path().join("moved-away");
    fs::rename(&project, &moved).unwrap();

    let err = keeper.sync(folder.id, &SilentReporter).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert_eq!(keeper.phase(folder.id), SyncPhase::Failed);

    let stored = keeper.get_folder(folder.id).unwrap();
    assert_eq!(stored.aggregate_checksum, first.folder.aggregate_checksum);
    assert_eq!(stored.file_count, Some(3));
    assert_eq!(stored.total_bytes, first.folder.total_bytes);
    assert_eq!(keeper.list_files(folder.id).unwrap().len(), 3);

    // Failures are not sticky.
    fs::rename(&moved, &project).unwrap();
    keeper.sync(folder.id, &SilentReporter).unwrap();
    assert_eq!(keeper.phase(folder.id), SyncPhase::Idle);
}

#[test]
fn test_identical_trees_share_aggregate_checksum() {
    let (tmp, keeper) = setup(&[]);
    let left = tmp.path().join("left");
    let right = tmp.path().join("right");
    // Same content, written in different orders.
    write(&left, "a/1.txt", "one");
    write(&left, "b.txt", "two");
    write(&left, "c/d/e.txt", "three");
    write(&right, "c/d/e.txt", "three");
    write(&right, "b.txt", "two");
    write(&right, "a/1.txt", "one");

    let l = keeper.add_folder(&left).unwrap();
    let r = keeper.add_folder(&right).unwrap();
    let l_report = keeper.sync(l.id, &SilentReporter).unwrap();
    let r_report = keeper.sync(r.id, &SilentReporter).unwrap();

    assert!(l_report.folder.aggregate_checksum.is_some());
    assert_eq!(
        l_report.folder.aggregate_checksum,
        r_report.folder.aggregate_checksum
    );

    // The aggregate covers checksums in route order. A rename that moves a
    // file past another changes it; one that keeps its position does not.
    fs::rename(right.join("b.txt"), right.join("b2.txt")).unwrap();
    let same_order = keeper.sync(r.id, &SilentReporter).unwrap();
    assert_eq!(
        l_report.folder.aggregate_checksum,
        same_order.folder.aggregate_checksum
    );

    fs::rename(right.join("b2.txt"), right.join("z.txt")).unwrap();
    let renamed = keeper.sync(r.id, &SilentReporter).unwrap();
    assert_ne!(
        l_report.folder.aggregate_checksum,
        renamed.folder.aggregate_checksum
    );
}

#[test]
fn test_empty_folder_sync() {
    let (tmp, keeper) = setup(&[]);
    let root = tmp.path().join("empty");
    fs::create_dir_all(&root).unwrap();
    let folder = keeper.add_folder(&root).unwrap();

    let report = keeper.sync(folder.id, &SilentReporter).unwrap();
    assert_eq!(report.folder.file_count, Some(0));
    assert_eq!(report.folder.total_bytes, Some(0));
    assert_eq!(
        report.folder.aggregate_checksum.as_deref(),
        Some(hasher::hash_data(b"").as_str())
    );
}

#[test]
fn test_unknown_folder_is_not_found() {
    let (_tmp, keeper) = setup(&[]);
    let err = keeper
        .sync(uuid::Uuid::new_v4(), &SilentReporter)
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_concurrent_sync_of_same_folder_is_rejected() {
    let tmp = tempdir().unwrap();
    let project = create_project(tmp.path());
    let store = Arc::new(MemoryStore::new());
    let folder = folder_keeper_core::storage::Folder::new(&project);
    store.insert_folder(&folder).unwrap();
    let other_root = tmp.path().join("other");
    write(&other_root, "x.txt", "x");
    let other = folder_keeper_core::storage::Folder::new(&other_root);
    store.insert_folder(&other).unwrap();

    let locks = FolderLocks::new();
    let engine = SyncEngine::new(
        Arc::clone(&store),
        Arc::new(test_config(tmp.path(), &[])),
        locks.clone(),
    );

    let held = locks.try_acquire(folder.id, "retire").unwrap();
    let err = engine.sync(folder.id, &SilentReporter).unwrap_err();
    assert!(matches!(err, Error::Busy(_)));
    assert!(err.is_retryable());
    assert!(store.list_by_folder(folder.id).unwrap().is_empty());

    // Other folders are unaffected.
    engine.sync(other.id, &SilentReporter).unwrap();

    drop(held);
    engine.sync(folder.id, &SilentReporter).unwrap();
    assert_eq!(store.list_by_folder(folder.id).unwrap().len(), 4);
}

#[test]
fn test_different_folders_sync_in_parallel() {
    let (tmp, keeper) = setup(&[]);
    let ids: Vec<uuid::Uuid> = (0..4)
        .map(|n| {
            let root = tmp.path().join(format!("f{}", n));
            for i in 0..10 {
                write(&root, &format!("d{}/file{}.txt", i % 3, i), &format!("{}-{}", n, i));
            }
            keeper.add_folder(&root).unwrap().id
        })
        .collect();

    std::thread::scope(|s| {
        for id in &ids {
            let keeper = &keeper;
            s.spawn(move || keeper.sync(*id, &SilentReporter).unwrap());
        }
    });

    for id in &ids {
        assert_eq!(keeper.get_folder(*id).unwrap().file_count, Some(10));
    }
}

#[test]
fn test_sync_all_continues_past_failures() {
    let (tmp, keeper) = setup(&[]);
    let good = tmp.path().join("good");
    write(&good, "a.txt", "a");
    let good = keeper.add_folder(&good).unwrap();
    let bad = keeper.add_folder(tmp.path().join("never-created")).unwrap();

    let results = keeper.sync_all(&SilentReporter).unwrap();
    assert_eq!(results.len(), 2);
    for (id, result) in &results {
        if *id == good.id {
            assert!(result.is_ok());
        } else {
            assert_eq!(*id, bad.id);
            assert!(matches!(result, Err(Error::NotFound(_))));
        }
    }
}

#[test]
fn test_add_folder_validation_and_conflict() {
    let (tmp, keeper) = setup(&[]);
    let root = tmp.path().join("dup");
    fs::create_dir_all(&root).unwrap();

    assert!(matches!(
        keeper.add_folder("relative/path"),
        Err(Error::Validation(_))
    ));

    keeper.add_folder(&root).unwrap();
    let with_slash = format!("{}/", root.display());
    assert!(matches!(keeper.add_folder(&with_slash), Err(Error::Conflict(_))));
    assert_eq!(keeper.list_folders().unwrap().len(), 1);
}

#[test]
fn test_memory_store_backend() {
    let tmp = tempdir().unwrap();
    let keeper = Keeper::new(
        Arc::new(MemoryStore::new()),
        Arc::new(test_config(tmp.path(), &[".git"])),
    );
    let project = create_project(tmp.path());
    let folder = keeper.add_folder(&project).unwrap();

    let report = keeper.sync(folder.id, &SilentReporter).unwrap();
    assert_eq!(report.folder.file_count, Some(3));
    assert_eq!(keeper.store().list_by_folder(folder.id).unwrap().len(), 3);
}

fn assert_summary_survives_pattern_edits<S: Catalog>(keeper: &Keeper<S>, root: &Path) {
    for i in 0..20 {
        write(root, &format!("dir{}/file{}.txt", i % 4, i), &format!("content {}", i));
    }
    let folder = keeper.add_folder(root).unwrap();

    for round in 0..50 {
        std::thread::scope(|s| {
            s.spawn(|| keeper.sync(folder.id, &SilentReporter).unwrap());
            s.spawn(|| {
                for _ in 0..20 {
                    keeper
                        .set_exclude_patterns(folder.id, vec!["*.tmp".to_string()])
                        .unwrap();
                }
            });
        });

        let stored = keeper.get_folder(folder.id).unwrap();
        let items = keeper.list_files(folder.id).unwrap();
        let expected = hasher::aggregate_checksum(
            items
                .iter()
                .map(|i| (i.relative_route.as_str(), i.content_checksum.as_str())),
        );
        assert_eq!(stored.file_count, Some(items.len() as u64), "round {}", round);
        assert_eq!(stored.aggregate_checksum, Some(expected), "round {}", round);
        assert_eq!(stored.exclude_patterns, vec!["*.tmp".to_string()]);
    }
}

#[test]
fn test_pattern_edits_during_sync_keep_summary_consistent() {
    let (tmp, keeper) = setup(&[]);
    assert_summary_survives_pattern_edits(&keeper, &tmp.path().join("sqlite"));

    let memory = Keeper::new(
        Arc::new(MemoryStore::new()),
        Arc::new(test_config(tmp.path(), &[])),
    );
    assert_summary_survives_pattern_edits(&memory, &tmp.path().join("memory"));
}
