//! Tests for file-system capabilities.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use tempfile::TempDir;
use time::OffsetDateTime;
use time::macros::datetime;

use super::*;

const MODIFIED: OffsetDateTime = datetime!(2024-03-01 12:00 UTC);

#[fixture]
fn content() -> Arc<InMemoryFileSystem> {
    Arc::new(
        InMemoryFileSystem::new()
            .with_file("views/weather 1.0/index.html", "<p>sunny</p>", MODIFIED)
            .with_file("plugindata/weather 1.0/tree.json", "{}", MODIFIED)
            .with_file("plugindata/clock 1.0/secret.txt", "hidden", MODIFIED),
    )
}

#[rstest]
#[case::plain("a/b.txt", "a/b.txt")]
#[case::current_dir("./a/./b.txt", "a/b.txt")]
#[case::empty("", "")]
fn normalise_accepts_relative_paths(#[case] input: &str, #[case] expected: &str) {
    let normalised = normalise(Utf8Path::new(input)).expect("path should normalise");
    assert_eq!(normalised, Utf8PathBuf::from(expected));
}

#[rstest]
#[case::parent("../etc/passwd")]
#[case::nested_parent("a/../../b")]
#[case::absolute("/etc/passwd")]
fn normalise_rejects_escapes(#[case] input: &str) {
    let error = normalise(Utf8Path::new(input)).expect_err("path should be rejected");
    assert!(matches!(error, FsError::AccessDenied { .. }));
}

#[rstest]
fn memory_stat_reports_length_and_mtime(content: Arc<InMemoryFileSystem>) {
    let stat = content
        .stat(Utf8Path::new("views/weather 1.0/index.html"))
        .expect("stat");
    assert_eq!(stat.len, 12);
    assert_eq!(stat.modified, MODIFIED);
}

#[rstest]
fn memory_missing_file_is_not_found(content: Arc<InMemoryFileSystem>) {
    let error = content
        .read(Utf8Path::new("views/weather 1.0/missing.css"))
        .expect_err("missing");
    assert!(matches!(error, FsError::NotFound { .. }));
    assert!(!content.exists(Utf8Path::new("views/weather 1.0/missing.css")));
}

#[rstest]
fn memory_remove_forgets_file(content: Arc<InMemoryFileSystem>) {
    assert!(content.remove("plugindata/weather 1.0/tree.json"));
    assert!(!content.exists(Utf8Path::new("plugindata/weather 1.0/tree.json")));
    assert!(!content.remove("plugindata/weather 1.0/tree.json"));
}

#[rstest]
fn scoped_reads_under_prefix(content: Arc<InMemoryFileSystem>) {
    let scoped = ScopedFileSystem::new(content, "plugindata/weather 1.0").expect("scope");
    let text = scoped
        .read_to_string(Utf8Path::new("tree.json"))
        .expect("read");
    assert_eq!(text, "{}");
}

#[rstest]
fn scoped_denies_sibling_plugin_data(content: Arc<InMemoryFileSystem>) {
    let scoped = ScopedFileSystem::new(content, "plugindata/weather 1.0").expect("scope");
    let error = scoped
        .read(Utf8Path::new("../clock 1.0/secret.txt"))
        .expect_err("escape must fail");
    assert!(matches!(error, FsError::AccessDenied { .. }));
    assert!(!scoped.exists(Utf8Path::new("../clock 1.0/secret.txt")));
}

#[rstest]
fn scoped_errors_report_caller_path(content: Arc<InMemoryFileSystem>) {
    let scoped = ScopedFileSystem::new(content, "plugindata/weather 1.0").expect("scope");
    let error = scoped
        .stat(Utf8Path::new("nope.json"))
        .expect_err("missing");
    assert_eq!(error.to_string(), "no such file: nope.json");
}

#[rstest]
fn mounted_routes_by_leading_directory(content: Arc<InMemoryFileSystem>) {
    let shared: Arc<dyn PluginFileSystem> = content;
    let mounted = MountedFileSystem::new()
        .mount(
            "views",
            Arc::new(ScopedFileSystem::new(Arc::clone(&shared), "views/weather 1.0").expect("scope")),
        )
        .and_then(|fs| {
            fs.mount(
                "data",
                Arc::new(
                    ScopedFileSystem::new(shared, "plugindata/weather 1.0").expect("scope"),
                ),
            )
        })
        .expect("mount");

    assert!(mounted.exists(Utf8Path::new("views/index.html")));
    assert!(mounted.exists(Utf8Path::new("data/tree.json")));
    let error = mounted
        .read(Utf8Path::new("other/file.txt"))
        .expect_err("unmounted");
    assert!(matches!(error, FsError::AccessDenied { .. }));
}

#[test]
fn directory_backend_reads_real_files() {
    let temp = TempDir::new().expect("temp dir");
    std::fs::create_dir_all(temp.path().join("views")).expect("mkdir");
    std::fs::write(temp.path().join("views/app.js"), b"run()").expect("write");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8 temp path");

    let fs = DirFileSystem::open(root).expect("open");
    assert!(fs.exists(Utf8Path::new("views/app.js")));
    assert!(!fs.exists(Utf8Path::new("views")));
    assert_eq!(fs.read(Utf8Path::new("views/app.js")).expect("read"), b"run()");
    assert_eq!(fs.stat(Utf8Path::new("views/app.js")).expect("stat").len, 5);
    assert!(matches!(
        fs.read(Utf8Path::new("../outside")),
        Err(FsError::AccessDenied { .. })
    ));
}

#[test]
fn directory_backend_rejects_missing_root() {
    let error = DirFileSystem::open("/definitely/not/a/colloquy/root").expect_err("missing root");
    assert!(matches!(error, FsError::NotFound { .. }));
}
