//! Purpose: End-to-end coverage of the native bootstrap against the embedded payload.
//! Exports: Integration tests only.
//! Role: Exercise resolver, extraction, load guard and backend binding through `VolumeControl`.
//! Invariants: Each test extracts into its own temp directory, so shared-guard state never
//! leaks between tests.
//! Notes: Tests that need a working mixer are ignored by default.
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use volctl::api::{
    ErrorKind, Extraction, IsolationDomain, LibraryIdentity, LoadGuard, Placement, PayloadStore,
    ReusePolicy, VolumeControl, materialize, resolve,
};

fn library_files(dir: &Path) -> Vec<PathBuf> {
    let extension = LibraryIdentity::host().platform_extension.to_string();
    let extension = OsStr::new(&extension);
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .expect("read_dir")
        .map(|entry| entry.expect("entry").path())
        .filter(|path| path.extension() == Some(extension))
        .collect();
    files.sort();
    files
}

#[test]
fn default_construction_extracts_platform_named_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let control = VolumeControl::in_directory(temp.path()).expect("construct");

    let expected = temp.path().join(LibraryIdentity::host().resource_name());
    assert_eq!(control.library_path(), Some(expected.as_path()));
    assert_eq!(library_files(temp.path()), vec![expected]);
}

#[test]
fn many_instances_share_one_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let first = VolumeControl::in_directory(temp.path()).expect("first");
    for _ in 0..10 {
        let control = VolumeControl::in_directory(temp.path()).expect("construct");
        assert_eq!(control.library_path(), first.library_path());
    }
    assert_eq!(library_files(temp.path()).len(), 1);
}

#[test]
fn concurrent_construction_in_shared_mode_succeeds() {
    let temp = tempfile::tempdir().expect("tempdir");
    let guard = Arc::new(LoadGuard::new());
    let dir = temp.path();

    let controls: Vec<VolumeControl> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let guard = Arc::clone(&guard);
                scope.spawn(move || {
                    VolumeControl::builder()
                        .directory(dir)
                        .guard(guard)
                        .build()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("join").expect("construct"))
            .collect()
    });

    let paths: HashSet<_> = controls
        .iter()
        .map(|control| control.library_path().map(Path::to_path_buf))
        .collect();
    assert_eq!(paths.len(), 1);
    assert_eq!(guard.loaded_files(), 1);

    // Without a mixer every instance fails the same way; with one, all read the same level.
    let observed: HashSet<Result<i32, ErrorKind>> = controls
        .iter()
        .map(|control| control.get_volume().map_err(|err| err.kind()))
        .collect();
    assert_eq!(observed.len(), 1, "instances disagree: {observed:?}");
}

#[test]
fn concurrent_construction_with_independent_guards_succeeds() {
    let temp = tempfile::tempdir().expect("tempdir");
    let dir = temp.path();

    for _ in 0..5 {
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move || {
                        VolumeControl::builder()
                            .directory(dir)
                            .guard(Arc::new(LoadGuard::new()))
                            .build()
                            .map(|control| control.library_path().map(Path::to_path_buf))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("join"))
                .collect()
        });
        for result in results {
            let path = result.expect("construct").expect("native");
            assert_eq!(path, dir.join(LibraryIdentity::host().resource_name()));
        }
    }
    assert_eq!(library_files(dir).len(), 1);
}

#[test]
fn multi_domain_instances_get_unique_files() {
    let temp = tempfile::tempdir().expect("tempdir");
    let guard = Arc::new(LoadGuard::new());
    let default_path = temp.path().join(LibraryIdentity::host().resource_name());

    let shared = VolumeControl::builder()
        .directory(temp.path())
        .guard(Arc::clone(&guard))
        .build()
        .expect("shared");
    assert_eq!(shared.library_path(), Some(default_path.as_path()));

    let mut seen = HashSet::new();
    let mut domains = HashSet::new();
    for _ in 0..10 {
        let control = VolumeControl::builder()
            .directory(temp.path())
            .guard(Arc::clone(&guard))
            .multi_domain(true)
            .build()
            .expect("construct");
        let path = control.library_path().expect("native").to_path_buf();
        assert_ne!(path, default_path);
        assert!(path.is_file());
        assert!(seen.insert(path));

        let domain = control.domain().expect("domain");
        assert_ne!(domain, IsolationDomain::PROCESS);
        assert!(domains.insert(domain));
    }
    assert_eq!(library_files(temp.path()).len(), 11);
    assert_eq!(guard.loaded_files(), 11);
}

#[test]
fn explicit_domain_still_gets_a_fresh_copy_each_time() {
    let temp = tempfile::tempdir().expect("tempdir");
    let guard = Arc::new(LoadGuard::new());
    let domain = IsolationDomain::new();

    let build = || {
        VolumeControl::builder()
            .directory(temp.path())
            .guard(Arc::clone(&guard))
            .multi_domain(true)
            .domain(domain)
            .build()
            .expect("construct")
    };
    let first = build();
    let second = build();
    assert_ne!(first.library_path(), second.library_path());
    assert_eq!(first.domain(), Some(domain));
    assert_eq!(library_files(temp.path()).len(), 2);
}

#[test]
fn default_facade_then_domain_support_both_load() {
    let shared = VolumeControl::new().expect("shared facade");
    let private = VolumeControl::new_with_domain_support().expect("private facade");

    let private_path = private.library_path().expect("native").to_path_buf();
    assert_ne!(shared.library_path(), Some(private_path.as_path()));
    assert_eq!(shared.domain(), Some(IsolationDomain::PROCESS));
    assert_ne!(private.domain(), Some(IsolationDomain::PROCESS));

    drop(private);
    let _ = std::fs::remove_file(private_path);
}

#[test]
fn second_domain_cannot_share_a_loaded_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let guard = Arc::new(LoadGuard::new());
    VolumeControl::builder()
        .directory(temp.path())
        .guard(Arc::clone(&guard))
        .build()
        .expect("first domain");

    let err = VolumeControl::builder()
        .directory(temp.path())
        .guard(Arc::clone(&guard))
        .domain(IsolationDomain::new())
        .build()
        .expect_err("shared file in a second domain");
    assert_eq!(err.kind(), ErrorKind::NativeLoad);

    VolumeControl::builder()
        .directory(temp.path())
        .guard(guard)
        .domain(IsolationDomain::new())
        .multi_domain(true)
        .build()
        .expect("private copy in a second domain");
}

#[test]
fn ensure_loaded_is_idempotent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let identity = LibraryIdentity::host();
    let target = resolve(&identity, Some(temp.path()), None).expect("resolve");
    let payloads = PayloadStore::bundled();
    let payload = payloads.lookup(&identity.resource_name()).expect("bundled payload");
    let guard = LoadGuard::new();
    let extractions = AtomicUsize::new(0);

    let load = || {
        guard.ensure_loaded(IsolationDomain::PROCESS, &target, Placement::Shared, || {
            extractions.fetch_add(1, Ordering::SeqCst);
            materialize(payload, &target, Placement::Shared, ReusePolicy::Trust)
        })
    };
    let first = load().expect("first load");
    let second = load().expect("second load");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(extractions.load(Ordering::SeqCst), 1);
    assert!(guard.is_loaded(IsolationDomain::PROCESS, &target));
}

#[test]
fn stale_file_from_previous_run_is_replaced() {
    let temp = tempfile::tempdir().expect("tempdir");
    let identity = LibraryIdentity::host();
    let target = resolve(&identity, Some(temp.path()), None).expect("resolve");
    std::fs::write(target.path(), b"left over from an older version").expect("seed");

    let payloads = PayloadStore::bundled();
    let payload = payloads.lookup(&identity.resource_name()).expect("bundled payload");
    let out = materialize(payload, &target, Placement::Shared, ReusePolicy::Trust)
        .expect("materialize");
    assert_eq!(out.extraction, Extraction::Written);
    assert_eq!(std::fs::read(target.path()).expect("read"), payload);
    drop(out);

    VolumeControl::builder()
        .directory(temp.path())
        .guard(Arc::new(LoadGuard::new()))
        .build()
        .expect("loads the fresh copy");
}

#[test]
fn uncreatable_directory_is_invalid_path() {
    let temp = tempfile::tempdir().expect("tempdir");
    let blocker = temp.path().join("not-a-dir");
    std::fs::write(&blocker, b"").expect("blocker");

    let err = VolumeControl::in_directory(blocker.join("libs")).expect_err("invalid path");
    assert_eq!(err.kind(), ErrorKind::InvalidPath);
    assert!(blocker.is_file());
    assert!(library_files(temp.path()).is_empty());
}

#[test]
fn missing_payload_fails_before_loading() {
    let temp = tempfile::tempdir().expect("tempdir");
    let guard = Arc::new(LoadGuard::new());

    let err = VolumeControl::builder()
        .directory(temp.path())
        .guard(Arc::clone(&guard))
        .payloads(PayloadStore::empty())
        .build()
        .expect_err("payload missing");
    assert_eq!(err.kind(), ErrorKind::PayloadMissing);
    assert_eq!(guard.loaded_files(), 0);
    assert!(library_files(temp.path()).is_empty());
}

#[test]
fn corrupt_payload_is_native_load_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let payloads = PayloadStore::empty()
        .with_resource(LibraryIdentity::host().resource_name(), &b"this is not machine code"[..]);

    let err = VolumeControl::builder()
        .directory(temp.path())
        .guard(Arc::new(LoadGuard::new()))
        .payloads(payloads)
        .build()
        .expect_err("corrupt payload");
    assert_eq!(err.kind(), ErrorKind::NativeLoad);
}

#[test]
fn out_of_range_set_is_rejected_by_native_facade() {
    let temp = tempfile::tempdir().expect("tempdir");
    let control = VolumeControl::in_directory(temp.path()).expect("construct");
    for value in [-1, 101] {
        let err = control.set_volume(value).expect_err("out of range");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains(&value.to_string()));
    }
}

#[test]
#[ignore = "changes the real master volume; needs an audio mixer"]
fn native_round_trip_for_all_values() {
    let temp = tempfile::tempdir().expect("tempdir");
    let control = VolumeControl::in_directory(temp.path()).expect("construct");
    let before = control.get_volume().expect("get");

    for value in 0..=100 {
        control.set_volume(value).expect("set");
        assert_eq!(control.get_volume().expect("get"), value);
    }

    control.set_volume(before).expect("restore");
}
