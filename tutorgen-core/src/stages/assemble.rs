//! Chapters + graph → tutorial files on disk.
//!
//! Rendering is pure. Writing goes through a staging directory next to the
//! target which is renamed into place once every file is on disk, so a reader
//! never sees a half-written tutorial.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::context::TutorialContext;
use crate::error::StageError;
use crate::flow::Stage;
use crate::model::{
    project_dir_name, Abstraction, Chapter, RelationshipEdge, RelationshipGraph, TutorialFile,
    TutorialTree,
};

pub const INDEX_FILE: &str = "index.md";

fn escape_label(text: &str) -> String {
    text.replace('"', "#quot;").replace('\n', " ")
}

/// Mermaid `flowchart TD` with one node per abstraction and one edge per relationship.
pub fn render_diagram(abstractions: &[Abstraction], edges: &[RelationshipEdge]) -> String {
    let mut out = String::from("```mermaid\nflowchart TD\n");
    for a in abstractions {
        let _ = writeln!(out, "    {}[\"{}\"]", a.id, escape_label(&a.name));
    }
    for e in edges {
        let _ = writeln!(out, "    {} -- \"{}\" --> {}", e.from, escape_label(&e.label), e.to);
    }
    out.push_str("```\n");
    out
}

/// Render the index and the chapter files.
pub fn render_tree(
    project_name: &str,
    source: &str,
    abstractions: &[Abstraction],
    graph: &RelationshipGraph,
    chapters: &[Chapter],
) -> TutorialTree {
    let mut index = String::new();
    let _ = writeln!(index, "# Tutorial: {project_name}\n");
    let _ = writeln!(index, "{}\n", graph.summary.trim());
    let _ = writeln!(index, "**Source:** {source}\n");
    index.push_str(&render_diagram(abstractions, &graph.edges));
    index.push_str("\n## Chapters\n\n");
    for chapter in chapters {
        let name = abstractions
            .get(chapter.abstraction_id.index())
            .map(|a| a.name.as_str())
            .unwrap_or_default();
        let _ = writeln!(index, "{}. [{}]({})", chapter.ordinal, name, chapter.file_name);
    }

    TutorialTree {
        project_name: project_name.to_string(),
        index: TutorialFile {
            file_name: INDEX_FILE.to_string(),
            content: index,
        },
        chapters: chapters
            .iter()
            .map(|c| TutorialFile {
                file_name: c.file_name.clone(),
                content: c.body.clone(),
            })
            .collect(),
    }
}

/// Write `tree` to `<output_dir>/<project_name>/`, replacing any previous tutorial.
///
/// The directory name comes from [`project_dir_name`], so it never escapes `output_dir`.
///
/// Either the complete new tree ends up at the target or the target is left as
/// it was.
pub fn write_tree(tree: &TutorialTree, output_dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let target = output_dir.join(project_dir_name(&tree.project_name));

    let staging = tempfile::Builder::new()
        .prefix(".tutorgen-staging-")
        .tempdir_in(output_dir)?;
    for file in std::iter::once(&tree.index).chain(&tree.chapters) {
        fs::write(staging.path().join(&file.file_name), &file.content)?;
    }

    // Park an existing tutorial so it can be restored if the swap fails.
    let parked = if target.exists() {
        let holder = tempfile::Builder::new()
            .prefix(".tutorgen-previous-")
            .tempdir_in(output_dir)?;
        let parked_path = holder.path().join("tutorial");
        fs::rename(&target, &parked_path)?;
        Some((holder, parked_path))
    } else {
        None
    };

    let staged = staging.keep();
    if let Err(e) = fs::rename(&staged, &target) {
        error!(target = %target.display(), error = %e, "Failed to move tutorial into place");
        let _ = fs::remove_dir_all(&staged);
        if let Some((_, parked_path)) = &parked {
            let _ = fs::rename(parked_path, &target);
        }
        return Err(e);
    }
    // Dropping the holder deletes the previous tutorial.
    drop(parked);
    Ok(target)
}

pub struct TutorialAssembler;

#[async_trait]
impl Stage<TutorialContext> for TutorialAssembler {
    fn name(&self) -> &'static str {
        "assemble"
    }

    async fn run(&self, ctx: TutorialContext) -> Result<TutorialContext, StageError> {
        let tree = render_tree(
            ctx.project_name(),
            &ctx.config().source.to_string(),
            ctx.abstractions()?,
            ctx.graph()?,
            ctx.chapters()?,
        );
        let path = write_tree(&tree, &ctx.config().output_dir)?;
        info!(
            path = %path.display(),
            chapters = tree.chapters.len(),
            "Tutorial written"
        );
        ctx.with_tree(tree)?.with_output_path(path)
    }
}
