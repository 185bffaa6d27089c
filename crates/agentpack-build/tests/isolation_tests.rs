//! Isolation layout properties

use agentpack_build::{
    AggregationStats, Archive, ArchiveEntry, Bucket, BuildError, IntermediateArchive, Isolator,
};
use proptest::prelude::*;

fn intermediate(paths: &[String]) -> IntermediateArchive {
    let mut archive = Archive::new();
    for path in paths {
        let _ = archive.push(ArchiveEntry::new(path.clone(), path.as_bytes().to_vec(), "test"));
    }
    IntermediateArchive {
        bucket: Bucket::FullAgent,
        archive,
        modules: vec!["test".to_string()],
        stats: AggregationStats::default(),
    }
}

#[test]
fn test_verify_rejects_escaped_entries() {
    let isolator = Isolator::new("inst", "classdata");

    let mut archive = Archive::new();
    archive
        .push(ArchiveEntry::new("inst/a/A.classdata", vec![], "test"))
        .unwrap();
    archive
        .push(ArchiveEntry::new("a/B.classdata", vec![], "test"))
        .unwrap();
    assert!(matches!(
        isolator.verify(&archive),
        Err(BuildError::IsolationIntegrity { .. })
    ));

    let mut archive = Archive::new();
    archive
        .push(ArchiveEntry::new("inst/a/A.class", vec![], "test"))
        .unwrap();
    assert!(isolator.verify(&archive).is_err());
}

#[test]
fn test_custom_prefix_and_suffix() {
    let isolator = Isolator::new("agent/inst", "bin");
    let isolated = isolator
        .isolate(&intermediate(&[
            "a/A.class".to_string(),
            "LICENSE".to_string(),
            "a/LICENSE".to_string(),
        ]))
        .unwrap();

    let paths: Vec<&str> = isolated.archive.paths().collect();
    assert_eq!(
        paths,
        vec!["agent/inst/a/A.bin", "agent/inst/LICENSE.renamed", "agent/inst/a/LICENSE"]
    );
}

fn entry_path() -> impl Strategy<Value = String> {
    (
        prop::collection::vec("[a-z][a-z0-9]{0,6}", 0..4),
        "[A-Za-z][A-Za-z0-9$_-]{0,10}",
        prop::sample::select(vec![".class", ".properties", ".json", ".classdata", ""]),
    )
        .prop_map(|(dirs, name, ext)| {
            let mut parts = dirs;
            parts.push(format!("{}{}", name, ext));
            parts.join("/")
        })
}

proptest! {
    #[test]
    fn isolated_entries_stay_under_prefix(
        paths in prop::collection::btree_set(entry_path(), 1..40),
    ) {
        let paths: Vec<String> = paths.into_iter().collect();
        let isolator = Isolator::new("inst", "classdata");

        // `a/X.class` and `a/X.classdata` legitimately collide once renamed
        match isolator.isolate(&intermediate(&paths)) {
            Ok(isolated) => {
                prop_assert_eq!(isolated.archive.len(), paths.len());
                for path in isolated.archive.paths() {
                    prop_assert!(path.starts_with("inst/"));
                    prop_assert!(!path.ends_with(".class"));
                }
            }
            Err(BuildError::DuplicatePathConflict { path, .. }) => {
                prop_assert!(path.ends_with(".classdata"));
            }
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }

    #[test]
    fn isolation_is_reversible_for_classes(
        dirs in prop::collection::vec("[a-z][a-z0-9]{0,6}", 1..4),
        name in "[A-Z][A-Za-z0-9]{0,10}",
    ) {
        let path = format!("{}/{}.class", dirs.join("/"), name);
        let isolated = Isolator::new("inst", "classdata").isolated_path(&path);

        let restored = isolated
            .strip_prefix("inst/")
            .and_then(|p| p.strip_suffix(".classdata"))
            .map(|p| format!("{}.class", p));
        prop_assert_eq!(restored, Some(path));
    }
}
