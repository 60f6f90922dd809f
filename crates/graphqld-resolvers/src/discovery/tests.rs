//! Unit tests for directory discovery.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

fn touch(path: &Path, mode: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, "#!/bin/sh\n").expect("write resolver");
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("chmod");
}

#[fixture]
fn document_root() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(&dir.path().join("charCount.py"), 0o755);
    touch(&dir.path().join("python.py"), 0o700);
    touch(&dir.path().join("README.md"), 0o644);
    touch(&dir.path().join(".hidden.sh"), 0o755);
    touch(&dir.path().join("CharCountResponse/isEven.py"), 0o755);
    touch(&dir.path().join("Query/guestBook.py"), 0o755);
    dir
}

fn labels(locations: &[ResolverLocation]) -> Vec<String> {
    locations.iter().map(ResolverLocation::label).collect()
}

#[rstest]
fn walks_root_and_type_directories_in_sorted_order(document_root: TempDir) {
    let discovery = DirectoryDiscovery::new([document_root.path()], "Query");
    let locations = discovery.locations().expect("discovery succeeds");
    assert_eq!(
        labels(&locations),
        vec![
            "CharCountResponse.isEven",
            "Query.guestBook",
            "Query.charCount",
            "Query.python",
        ]
    );
}

#[rstest]
fn script_names_are_relative_to_the_root(document_root: TempDir) {
    let discovery = DirectoryDiscovery::new([document_root.path()], "Query");
    let locations = discovery.locations().expect("discovery succeeds");
    let is_even = locations
        .iter()
        .find(|location| location.field_name() == "isEven")
        .expect("isEven discovered");
    assert_eq!(is_even.script_name(), "CharCountResponse/isEven.py");
    assert!(is_even.executable().is_absolute());
}

#[rstest]
fn custom_root_type_applies_to_top_level_files(document_root: TempDir) {
    let discovery = DirectoryDiscovery::new([document_root.path()], "Root");
    let locations = discovery.locations().expect("discovery succeeds");
    assert!(labels(&locations).contains(&"Root.charCount".to_owned()));
}

#[test]
fn roots_are_walked_in_the_given_order() {
    let first = tempfile::tempdir().expect("tempdir");
    let second = tempfile::tempdir().expect("tempdir");
    touch(&first.path().join("b.sh"), 0o755);
    touch(&second.path().join("a.sh"), 0o755);

    let discovery = DirectoryDiscovery::new([first.path(), second.path()], "Query");
    let locations = discovery.locations().expect("discovery succeeds");
    assert_eq!(labels(&locations), vec!["Query.b", "Query.a"]);
}

#[test]
fn missing_root_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("absent");
    let err = DirectoryDiscovery::new([missing], "Query")
        .locations()
        .expect_err("missing root rejected");
    assert!(matches!(err, DiscoveryError::MissingRoot { .. }));
}

#[test]
fn static_sources_return_their_locations() {
    let locations = vec![ResolverLocation::new("Query", "now", "/bin/date")];
    assert_eq!(locations.locations().expect("static"), locations);
}

#[rstest]
fn graphql_documents_are_declarations_not_resolvers(document_root: TempDir) {
    touch(&document_root.path().join("schema.graphql"), 0o644);
    touch(&document_root.path().join("Query/types.graphql"), 0o644);
    touch(&document_root.path().join("notes.txt"), 0o644);

    let found = DirectoryDiscovery::new([document_root.path()], "Query")
        .discover()
        .expect("discovery succeeds");

    let names: Vec<String> = found
        .declarations
        .iter()
        .filter_map(|path| path.strip_prefix(document_root.path().canonicalize().ok()?).ok())
        .map(|path| path.display().to_string())
        .collect();
    assert_eq!(names, ["Query/types.graphql", "schema.graphql"]);
    assert_eq!(found.locations.len(), 4);
}

#[test]
fn static_sources_declare_no_types() {
    let locations = vec![ResolverLocation::new("Query", "now", "/bin/date")];
    let found = locations.discover().expect("static");
    assert!(found.declarations.is_empty());
    assert_eq!(found.locations, locations);
}

#[rstest]
fn fingerprints_change_when_the_root_changes(document_root: TempDir) {
    let discovery = DirectoryDiscovery::new([document_root.path()], "Query");
    let before = discovery.fingerprint().expect("fingerprint");
    assert_eq!(discovery.fingerprint().expect("fingerprint"), before);

    touch(&document_root.path().join("Query/added.sh"), 0o755);
    let added = discovery.fingerprint().expect("fingerprint");
    assert_ne!(added, before);
    assert_eq!(added.len(), before.len() + 1);

    fs::set_permissions(
        document_root.path().join("Query/added.sh"),
        fs::Permissions::from_mode(0o644),
    )
    .expect("chmod");
    assert_ne!(discovery.fingerprint().expect("fingerprint"), added);
}
