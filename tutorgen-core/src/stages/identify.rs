//! Files → named abstractions.
//!
//! One aggregate prompt is built from the crawled corpus. When the corpus is
//! larger than the prompt budget, [`select_corpus`] decides which files make
//! it in; the policy depends only on paths and sizes so it is stable across
//! runs.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::CorpusBudget;
use crate::context::TutorialContext;
use crate::error::{ParseError, StageError};
use crate::flow::Stage;
use crate::gateway::LlmGateway;
use crate::model::{Abstraction, AbstractionId, FileId, FileRecord};
use crate::response::{parse_yaml, required_text, IndexRef};

use super::ask_structured;

const STAGE: &str = "identify_abstractions";

/// File names that describe a project rather than implement it.
const MANIFEST_NAMES: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "setup.py",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Makefile",
    "Dockerfile",
];

fn is_manifest(path: &str) -> bool {
    let name = path.rsplit('/').next().unwrap_or(path);
    MANIFEST_NAMES.contains(&name) || name.starts_with("README")
}

/// At most `max_chars` characters from the start of `content`.
pub fn excerpt(content: &str, max_chars: usize) -> &str {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &content[..byte_idx],
        None => content,
    }
}

/// Files admitted into the identification prompt, in path order.
///
/// If every excerpt fits, every file is admitted. Otherwise files are ranked
/// manifest-like first, then by size descending, then by path, and admitted
/// greedily while they fit.
pub fn select_corpus(files: &[FileRecord], budget: &CorpusBudget) -> Vec<FileId> {
    let cost = |f: &FileRecord| excerpt(&f.content, budget.max_excerpt_chars).chars().count();
    let total: usize = files.iter().map(cost).sum();
    if total <= budget.prompt_budget_chars {
        return (0..files.len()).collect();
    }

    let mut ranked: Vec<FileId> = (0..files.len()).collect();
    ranked.sort_by(|&a, &b| {
        let (fa, fb) = (&files[a], &files[b]);
        is_manifest(&fb.path)
            .cmp(&is_manifest(&fa.path))
            .then(fb.size.cmp(&fa.size))
            .then(fa.path.cmp(&fb.path))
    });

    let mut used = 0usize;
    let mut admitted = BTreeSet::new();
    for id in ranked {
        let c = cost(&files[id]);
        if used + c <= budget.prompt_budget_chars {
            used += c;
            admitted.insert(id);
        }
    }
    info!(
        total_chars = total,
        budget = budget.prompt_budget_chars,
        admitted = admitted.len(),
        files = files.len(),
        "Corpus exceeds prompt budget, selected a subset"
    );
    admitted.into_iter().collect()
}

fn build_prompt(
    project: &str,
    files: &[FileRecord],
    selected: &[FileId],
    budget: &CorpusBudget,
    max_abstractions: usize,
) -> String {
    let mut corpus = String::new();
    let mut listing = String::new();
    for &id in selected {
        let file = &files[id];
        let _ = writeln!(listing, "- {id} # {}", file.path);
        let _ = write!(
            corpus,
            "--- File Index {id}: {} ---\n{}\n\n",
            file.path,
            excerpt(&file.content, budget.max_excerpt_chars)
        );
    }

    format!(
        "For the project `{project}`:\n\n\
         Codebase context:\n{corpus}\
         Identify the top {max_abstractions} most important core abstractions that help \
         a newcomer understand the codebase.\n\n\
         For each abstraction provide:\n\
         1. A concise `name`.\n\
         2. A beginner-friendly `description` of what it is, in around 100 words, \
         with a simple analogy.\n\
         3. A list of relevant `file_indices` (integers, optionally followed by `# path`).\n\n\
         List of file indices and paths present in the context:\n{listing}\n\
         Format the output as a YAML list of dictionaries:\n\n\
         ```yaml\n\
         - name: |\n    Query Processing\n  \
           description: |\n    Explains what the abstraction does.\n    \
           It's like a central dispatcher routing requests.\n  \
           file_indices:\n    - 0 # path/to/file1.py\n    - 3 # path/to/related.py\n\
         # ... up to {max_abstractions} abstractions\n\
         ```"
    )
}

/// Validate the identifier's answer and turn it into abstractions.
///
/// Entries past `max_abstractions` and later entries repeating an earlier name
/// (case-insensitive) are dropped with a warning. Anything else that does not
/// fit the schema is a [`ParseError`].
pub fn parse_abstractions(
    response: &str,
    file_count: usize,
    max_abstractions: usize,
) -> Result<Vec<Abstraction>, ParseError> {
    let value = parse_yaml(response)?;
    let entries = value
        .as_sequence()
        .ok_or_else(|| ParseError::Schema("expected a YAML list of abstractions".to_string()))?;
    if entries.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut seen = HashSet::new();
    let mut abstractions: Vec<Abstraction> = Vec::new();
    for (position, entry) in entries.iter().enumerate() {
        let map = entry.as_mapping().ok_or_else(|| {
            ParseError::Schema(format!("abstraction #{position} is not a mapping"))
        })?;
        let name = required_text(map, "name")?;
        let summary = required_text(map, "description")?;
        let indices = map
            .get("file_indices")
            .and_then(|v| v.as_sequence())
            .ok_or_else(|| {
                ParseError::Schema(format!("abstraction `{name}` has no `file_indices` list"))
            })?;

        let mut file_ids = BTreeSet::new();
        for raw in indices {
            match IndexRef::from_value(raw) {
                Some(IndexRef::Index(index)) if index < file_count => {
                    file_ids.insert(index);
                }
                Some(IndexRef::Index(index)) => {
                    return Err(ParseError::FileIndexOutOfRange {
                        index,
                        len: file_count,
                    });
                }
                _ => {
                    return Err(ParseError::Schema(format!(
                        "abstraction `{name}` has a non-integer file index: {raw:?}"
                    )));
                }
            }
        }

        if !seen.insert(name.to_lowercase()) {
            warn!(name = %name, "Dropping abstraction with duplicate name");
            continue;
        }
        if abstractions.len() >= max_abstractions {
            warn!(name = %name, max_abstractions, "Dropping abstraction beyond the requested count");
            continue;
        }
        let index = abstractions.len();
        abstractions.push(Abstraction {
            id: AbstractionId(index),
            name,
            summary,
            file_ids,
            discovery_index: index,
        });
    }
    Ok(abstractions)
}

pub struct AbstractionIdentifier {
    gateway: Arc<LlmGateway>,
}

impl AbstractionIdentifier {
    pub fn new(gateway: Arc<LlmGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Stage<TutorialContext> for AbstractionIdentifier {
    fn name(&self) -> &'static str {
        STAGE
    }

    async fn run(&self, ctx: TutorialContext) -> Result<TutorialContext, StageError> {
        let config = ctx.config();
        let files = ctx.files()?;
        let selected = select_corpus(files, &config.corpus);
        let prompt = build_prompt(
            ctx.project_name(),
            files,
            &selected,
            &config.corpus,
            config.max_abstractions,
        );
        debug!(prompt_chars = prompt.len(), files = selected.len(), "Built identification prompt");

        let file_count = files.len();
        let max = config.max_abstractions;
        let (abstractions, reprompts) = ask_structured(
            &self.gateway,
            STAGE,
            &prompt,
            config.max_parse_retries,
            |response| parse_abstractions(response, file_count, max),
        )
        .await?;

        info!(
            abstractions = abstractions.len(),
            reprompts, "Identified abstractions"
        );
        ctx.with_abstractions(abstractions)
            .map(|ctx| ctx.record_reprompts(STAGE, reprompts))
    }
}
