//! Chapter order + abstractions + files → chapters.
//!
//! Chapters are generated one at a time in reading order. Each prompt carries
//! a short digest of every chapter already written, so later chapters can
//! refer back to earlier ones.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::TutorialContext;
use crate::error::StageError;
use crate::flow::Stage;
use crate::gateway::LlmGateway;
use crate::model::{chapter_file_name, Abstraction, AbstractionId, Chapter, FileRecord};

use super::identify::excerpt;

const DIGEST_CHARS: usize = 400;

/// First prose paragraph of a chapter body, at most `max_chars` characters.
///
/// Headings, fences and blank lines are skipped.
pub fn chapter_digest(body: &str, max_chars: usize) -> String {
    let mut paragraph = Vec::new();
    let mut in_fence = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        if in_fence {
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        paragraph.push(trimmed);
    }
    let joined = paragraph.join(" ");
    let cut = excerpt(&joined, max_chars);
    if cut.len() < joined.len() {
        format!("{}...", cut.trim_end())
    } else {
        joined
    }
}

/// Strip an enclosing code fence and make sure the chapter heading is present.
pub fn normalise_body(response: &str, ordinal: usize, name: &str) -> String {
    let mut text = response.trim();
    if let Some(rest) = text.strip_prefix("```") {
        if let Some(body_start) = rest.find('\n') {
            let inner = &rest[body_start + 1..];
            text = inner.trim_end().strip_suffix("```").unwrap_or(inner).trim();
        }
    }

    let heading = format!("# Chapter {ordinal}: {name}");
    let body = match text.lines().next() {
        Some(first) if first.trim_start().starts_with("# ") => {
            let rest = text[first.len()..].trim_start_matches(['\r', '\n']);
            if rest.is_empty() {
                heading
            } else {
                format!("{heading}\n\n{rest}")
            }
        }
        _ if text.is_empty() => heading,
        _ => format!("{heading}\n\n{text}"),
    };
    format!("{}\n", body.trim_end())
}

/// Other abstractions whose name occurs in `body`, case-insensitively.
pub fn mentioned_abstractions(
    body: &str,
    own: AbstractionId,
    abstractions: &[Abstraction],
) -> BTreeSet<AbstractionId> {
    let lowered = body.to_lowercase();
    abstractions
        .iter()
        .filter(|a| a.id != own)
        .filter(|a| mentions(body, &lowered, &a.name))
        .map(|a| a.id)
        .collect()
}

fn mentions(body: &str, lowered: &str, name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() {
        return false;
    }
    let starts_word = name.chars().next().is_some_and(char::is_alphanumeric);
    let ends_word = name.chars().last().is_some_and(char::is_alphanumeric);
    let pattern = format!(
        "(?i){}{}{}",
        if starts_word { r"\b" } else { "" },
        regex::escape(name),
        if ends_word { r"\b" } else { "" }
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(body),
        Err(_) => lowered.contains(&name.to_lowercase()),
    }
}

struct ChapterPlan<'a> {
    abstraction: &'a Abstraction,
    ordinal: usize,
    file_name: String,
}

fn build_prompt(
    project: &str,
    plans: &[ChapterPlan<'_>],
    position: usize,
    files: &[FileRecord],
    previous: &[String],
    max_excerpt: usize,
) -> String {
    let current = &plans[position];
    let a = current.abstraction;

    let mut listing = String::new();
    for p in plans {
        let _ = writeln!(
            listing,
            "{}. [{}]({})",
            p.ordinal, p.abstraction.name, p.file_name
        );
    }

    let mut sources = String::new();
    for &id in &a.file_ids {
        if let Some(file) = files.get(id) {
            let _ = write!(
                sources,
                "--- File: {} ---\n{}\n\n",
                file.path,
                excerpt(&file.content, max_excerpt)
            );
        }
    }
    if sources.is_empty() {
        sources.push_str("(no representative files)\n");
    }

    let mut prior = String::new();
    for (p, digest) in plans.iter().zip(previous) {
        let _ = writeln!(prior, "- Chapter {} ({}): {}", p.ordinal, p.abstraction.name, digest);
    }
    if prior.is_empty() {
        prior.push_str("This is the first chapter.\n");
    }

    let next = match plans.get(position + 1) {
        Some(p) => format!(
            "End with a short teaser for the next chapter, [{}]({}).",
            p.abstraction.name, p.file_name
        ),
        None => "This is the last chapter; close with a brief recap of the tutorial.".to_string(),
    };

    format!(
        "Write a very beginner-friendly tutorial chapter (in Markdown) for the project \
         `{project}` about the concept: \"{name}\". This is Chapter {ordinal}.\n\n\
         Concept details:\n- Name: {name}\n- Description:\n{summary}\n\n\
         Complete tutorial structure:\n{listing}\n\
         Context from previous chapters:\n{prior}\n\
         Relevant code snippets:\n{sources}\
         Instructions for the chapter:\n\
         - Start with the heading: `# Chapter {ordinal}: {name}`.\n\
         - Begin with a high-level motivation: what problem does this abstraction solve? \
         Start from a concrete use case.\n\
         - Explain the key concepts one by one, in simple terms.\n\
         - Walk through a minimal example of using the abstraction. Keep every code block \
         under 10 lines.\n\
         - Describe what happens internally, step by step. A simple ```mermaid \
         sequenceDiagram with at most five participants may help.\n\
         - When you mention another abstraction from the structure above, link to its \
         chapter with the Markdown link shown there.\n\
         - Use analogies and examples throughout.\n\
         - Conclude with a short summary. {next}\n\n\
         Output only the Markdown content of the chapter.",
        name = a.name,
        ordinal = current.ordinal,
        summary = a.summary,
    )
}

pub struct ChapterWriter {
    gateway: Arc<LlmGateway>,
}

impl ChapterWriter {
    pub fn new(gateway: Arc<LlmGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Stage<TutorialContext> for ChapterWriter {
    fn name(&self) -> &'static str {
        "write_chapters"
    }

    async fn run(&self, ctx: TutorialContext) -> Result<TutorialContext, StageError> {
        let abstractions = ctx.abstractions()?;
        let files = ctx.files()?;
        let order = ctx.order()?;
        let max_excerpt = ctx.config().corpus.max_excerpt_chars;

        let mut plans = Vec::with_capacity(order.len());
        for (position, id) in order.iter().enumerate() {
            let abstraction = abstractions
                .get(id.index())
                .ok_or(StageError::MissingInput("abstraction referenced by chapter order"))?;
            let ordinal = position + 1;
            plans.push(ChapterPlan {
                abstraction,
                ordinal,
                file_name: chapter_file_name(ordinal, &abstraction.name),
            });
        }

        let mut chapters = Vec::with_capacity(plans.len());
        let mut digests: Vec<String> = Vec::with_capacity(plans.len());
        for position in 0..plans.len() {
            let plan = &plans[position];
            let prompt = build_prompt(
                ctx.project_name(),
                &plans,
                position,
                files,
                &digests,
                max_excerpt,
            );
            debug!(
                chapter = plan.ordinal,
                abstraction = %plan.abstraction.name,
                prompt_chars = prompt.len(),
                "Writing chapter"
            );
            let response = self.gateway.call(&prompt).await?;
            let body = normalise_body(&response, plan.ordinal, &plan.abstraction.name);
            let outgoing_links =
                mentioned_abstractions(&body, plan.abstraction.id, abstractions);
            digests.push(chapter_digest(&body, DIGEST_CHARS));
            info!(
                chapter = plan.ordinal,
                abstraction = %plan.abstraction.name,
                links = outgoing_links.len(),
                "Chapter written"
            );
            chapters.push(Chapter {
                abstraction_id: plan.abstraction.id,
                ordinal: plan.ordinal,
                file_name: plan.file_name.clone(),
                body,
                outgoing_links,
            });
        }
        drop(plans);

        ctx.with_chapters(chapters)
    }
}
