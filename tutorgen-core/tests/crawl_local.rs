mod common;

use std::fs;
use tempfile::tempdir;
use tutorgen_core::crawl::{CrawlOptions, GitLocation, PatternSet, RepositoryCrawler, SourceLocator};
use tutorgen_core::error::CrawlError;
use tutorgen_core::model::SkipReason;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn crawler(include: &[&str], exclude: &[&str], max_file_size: u64) -> RepositoryCrawler {
    RepositoryCrawler::new(CrawlOptions {
        include: strings(include),
        exclude: strings(exclude),
        max_file_size,
    })
}

#[test]
fn keeps_only_included_small_files_outside_excluded_dirs() {
    let dir = tempdir().unwrap();
    common::write_tree(
        dir.path(),
        &[
            ("a.py", "x".repeat(500).as_str()),
            ("tests/b.py", "y".repeat(200).as_str()),
            ("c.txt", "z".repeat(100).as_str()),
        ],
    );

    let report = crawler(&["*.py"], &["tests/*"], 1000)
        .crawl_dir(dir.path())
        .expect("crawl should succeed");

    let paths: Vec<&str> = report.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["a.py"]);
    assert_eq!(report.files[0].size, 500);
    assert!(report.skipped.is_empty());
}

struct TestCase {
    name: &'static str,
    include: &'static [&'static str],
    exclude: &'static [&'static str],
    max_file_size: u64,
    expected: &'static [&'static str],
}

#[test]
fn filter_rules_table_driven() {
    let dir = tempdir().unwrap();
    common::write_tree(
        dir.path(),
        &[
            ("Makefile", "all:"),
            ("src/main.rs", "fn main() {}"),
            ("src/nested/deep/lib.rs", "pub fn f() {}"),
            ("docs/guide.md", "# Guide"),
            ("notes.txt", "notes"),
            ("big.rs", "b".repeat(64).as_str()),
        ],
    );

    let cases = [
        TestCase {
            name: "empty include matches everything",
            include: &[],
            exclude: &[],
            max_file_size: 1_000,
            expected: &[
                "Makefile",
                "big.rs",
                "docs/guide.md",
                "notes.txt",
                "src/main.rs",
                "src/nested/deep/lib.rs",
            ],
        },
        TestCase {
            name: "star crosses directories",
            include: &["src/*.rs"],
            exclude: &[],
            max_file_size: 1_000,
            expected: &["src/main.rs", "src/nested/deep/lib.rs"],
        },
        TestCase {
            name: "bare file name pattern",
            include: &["Makefile", "*.md"],
            exclude: &[],
            max_file_size: 1_000,
            expected: &["Makefile", "docs/guide.md"],
        },
        TestCase {
            name: "exclude wins over include",
            include: &["*"],
            exclude: &["docs/*", "*.txt"],
            max_file_size: 1_000,
            expected: &["Makefile", "big.rs", "src/main.rs", "src/nested/deep/lib.rs"],
        },
        TestCase {
            name: "size limit is inclusive",
            include: &["*.rs"],
            exclude: &[],
            max_file_size: 13,
            expected: &["src/main.rs", "src/nested/deep/lib.rs"],
        },
    ];

    for case in cases {
        let report = crawler(case.include, case.exclude, case.max_file_size)
            .crawl_dir(dir.path())
            .unwrap_or_else(|e| panic!("{}: crawl failed: {e}", case.name));
        let paths: Vec<&str> = report.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, case.expected, "case: {}", case.name);
    }
}

#[test]
fn oversized_and_non_utf8_files_are_recorded_not_fatal() {
    let dir = tempdir().unwrap();
    common::write_tree(dir.path(), &[("ok.rs", "fn ok() {}"), ("huge.rs", "h".repeat(2_000).as_str())]);
    fs::write(dir.path().join("blob.rs"), [0xff, 0xfe, 0x00, 0x9f]).unwrap();

    let report = crawler(&["*.rs"], &[], 1_000).crawl_dir(dir.path()).unwrap();

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].path, "ok.rs");
    assert_eq!(report.skipped.len(), 2);

    let huge = report.skipped.iter().find(|s| s.path == "huge.rs").unwrap();
    assert_eq!(huge.reason, SkipReason::TooLarge { size: 2_000, max: 1_000 });
    let blob = report.skipped.iter().find(|s| s.path == "blob.rs").unwrap();
    assert!(matches!(blob.reason, SkipReason::Unreadable(_)));
}

#[test]
fn git_metadata_is_never_crawled() {
    let dir = tempdir().unwrap();
    common::write_tree(dir.path(), &[("main.py", "print()"), (".git/config", "[core]")]);

    let report = crawler(&[], &[], 1_000).crawl_dir(dir.path()).unwrap();
    let paths: Vec<&str> = report.files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["main.py"]);
}

#[test]
fn output_is_sorted_and_stable_across_runs() {
    let dir = tempdir().unwrap();
    common::write_tree(
        dir.path(),
        &[("b/z.py", "1"), ("a.py", "2"), ("b/a.py", "3"), ("B.py", "4"), ("ab.py", "5")],
    );

    let c = crawler(&["*.py"], &[], 1_000);
    let first: Vec<String> = c.crawl_dir(dir.path()).unwrap().files.into_iter().map(|f| f.path).collect();
    let second: Vec<String> = c.crawl_dir(dir.path()).unwrap().files.into_iter().map(|f| f.path).collect();

    let mut sorted = first.clone();
    sorted.sort();
    assert_eq!(first, sorted);
    assert_eq!(first, second);
    assert_eq!(first.len(), 5);
}

#[test]
fn missing_root_and_bad_pattern_are_errors() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(matches!(
        crawler(&[], &[], 10).crawl_dir(&missing),
        Err(CrawlError::RootNotFound(_))
    ));

    assert!(matches!(
        PatternSet::new(&strings(&["[unclosed"]), &[]),
        Err(CrawlError::InvalidPattern { .. })
    ));
}

#[tokio::test]
async fn crawl_accepts_a_local_locator() {
    let dir = tempdir().unwrap();
    common::write_tree(dir.path(), &[("lib.rs", "pub fn a() {}")]);

    let report = crawler(&["*.rs"], &[], 1_000)
        .crawl(&SourceLocator::Local(dir.path().to_path_buf()))
        .await
        .unwrap();
    assert_eq!(report.files.len(), 1);
}

#[test]
fn git_locations_and_project_names() {
    let loc = GitLocation::parse("https://github.com/acme/widget/tree/v2/crates/core");
    assert_eq!(loc.clone_url, "https://github.com/acme/widget");
    assert_eq!(loc.reference.as_deref(), Some("v2"));
    assert_eq!(loc.subdir.as_deref(), Some("crates/core"));

    let plain = GitLocation::parse("git@github.com:acme/widget.git");
    assert_eq!(plain.clone_url, "git@github.com:acme/widget.git");
    assert_eq!(plain.reference, None);

    let git = SourceLocator::Git {
        url: "git@github.com:acme/widget.git".to_string(),
        reference: None,
        token: Some("secret".to_string()),
    };
    assert_eq!(git.project_name(), "widget");
    assert!(!format!("{git:?}").contains("secret"));

    let dir = tempdir().unwrap();
    let local = dir.path().join("my-project");
    fs::create_dir(&local).unwrap();
    assert_eq!(SourceLocator::Local(local).project_name(), "my-project");
}
