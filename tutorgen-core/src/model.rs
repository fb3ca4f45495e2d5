//! Data model shared by every pipeline stage.
//!
//! Every artifact here is produced exactly once by one stage and only read by
//! the stages after it. Nothing in this module performs I/O.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path};

/// Index of a [`FileRecord`] in the crawled, path-sorted file list.
pub type FileId = usize;

/// A single source file that survived filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Path relative to the crawl root, always with `/` separators.
    pub path: String,
    pub content: String,
    /// Size on disk in bytes.
    pub size: u64,
}

/// Why a file was left out of the crawl.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    TooLarge { size: u64, max: u64 },
    Unreadable(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooLarge { size, max } => {
                write!(f, "file size ({size} bytes) exceeds limit ({max} bytes)")
            }
            SkipReason::Unreadable(reason) => write!(f, "unreadable: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: String,
    pub reason: SkipReason,
}

/// Output of the crawler: kept files in lexicographic path order plus the
/// non-fatal filter warnings recorded on the way.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlReport {
    pub files: Vec<FileRecord>,
    pub skipped: Vec<SkippedFile>,
}

/// Identifier of an abstraction; dense, assigned in discovery order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AbstractionId(pub usize);

impl AbstractionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AbstractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

/// A named conceptual unit of the source system, as identified by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Abstraction {
    pub id: AbstractionId,
    pub name: String,
    pub summary: String,
    /// Representative files, by index into the crawled file list.
    pub file_ids: BTreeSet<FileId>,
    /// Position in the model's answer; the tie-break used by the orderer.
    pub discovery_index: usize,
}

/// Directed, labeled relationship: `from` depends on / is used by `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipEdge {
    pub from: AbstractionId,
    pub to: AbstractionId,
    pub label: String,
}

/// Output of the relationship analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipGraph {
    /// One-paragraph project summary.
    pub summary: String,
    /// Edges that reference known abstractions only.
    pub edges: Vec<RelationshipEdge>,
}

/// An edge the analyzer had to drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphConsistencyWarning {
    pub from: String,
    pub to: String,
    pub label: String,
    pub reason: String,
}

impl fmt::Display for GraphConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dropped edge `{}` -[{}]-> `{}`: {}",
            self.from, self.label, self.to, self.reason
        )
    }
}

/// Pedagogical reading order. Always a permutation of the abstraction ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterOrder(Vec<AbstractionId>);

impl ChapterOrder {
    pub(crate) fn new(ids: Vec<AbstractionId>) -> Self {
        Self(ids)
    }

    pub fn ids(&self) -> &[AbstractionId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = AbstractionId> + '_ {
        self.0.iter().copied()
    }
}

/// One generated tutorial chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub abstraction_id: AbstractionId,
    /// 1-based position in the chapter order.
    pub ordinal: usize,
    pub file_name: String,
    pub body: String,
    /// Other abstractions this chapter mentions.
    pub outgoing_links: BTreeSet<AbstractionId>,
}

/// A single rendered output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TutorialFile {
    pub file_name: String,
    pub content: String,
}

/// The final artifact: root index plus the ordered chapter files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TutorialTree {
    pub project_name: String,
    pub index: TutorialFile,
    pub chapters: Vec<TutorialFile>,
}

/// Lowercase ASCII slug; runs of anything that is not alphanumeric become `_`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("chapter");
    }
    slug
}

/// Directory name for a project's tutorial inside the output directory.
///
/// A name that is a single plain path component is kept as is. Anything that
/// could leave the output directory (separators, `..`, a root) is slugified.
pub fn project_dir_name(name: &str) -> String {
    let name = name.trim();
    let plain = !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != ".."
        && matches!(
            Path::new(name).components().collect::<Vec<_>>().as_slice(),
            [Component::Normal(_)]
        );
    if plain {
        name.to_string()
    } else if name.chars().any(|c| c.is_ascii_alphanumeric()) {
        slugify(name)
    } else {
        "project".to_string()
    }
}

/// File name of a chapter: two-digit ordinal plus slug, e.g. `03_flow_engine.md`.
pub fn chapter_file_name(ordinal: usize, name: &str) -> String {
    format!("{:02}_{}.md", ordinal, slugify(name))
}
