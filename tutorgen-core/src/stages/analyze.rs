//! Abstractions → project summary and relationship graph.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::TutorialContext;
use crate::error::{ParseError, StageError};
use crate::flow::Stage;
use crate::gateway::LlmGateway;
use crate::model::{
    Abstraction, AbstractionId, GraphConsistencyWarning, RelationshipEdge, RelationshipGraph,
};
use crate::response::{parse_yaml, required_text, IndexRef};

use super::ask_structured;

const STAGE: &str = "analyze_relationships";

fn build_prompt(project: &str, abstractions: &[Abstraction]) -> String {
    let mut context = String::new();
    let mut listing = String::new();
    for a in abstractions {
        let _ = writeln!(listing, "- {} # {}", a.id.index(), a.name);
        let _ = write!(
            context,
            "- Index {} # {}\n  {}\n",
            a.id.index(),
            a.name,
            a.summary.replace('\n', "\n  ")
        );
    }

    format!(
        "Based on the following abstractions of the project `{project}`:\n\n\
         List of abstraction indices and names:\n{listing}\n\
         Context (abstractions and descriptions):\n{context}\n\
         Please provide:\n\
         1. A high-level `summary` of the project's main purpose and functionality in a \
         few beginner-friendly sentences.\n\
         2. A list (`relationships`) describing the key interactions between these \
         abstractions. For each relationship specify:\n\
         - `from_abstraction`: index of the source abstraction (e.g. `0 # AbstractionName1`)\n\
         - `to_abstraction`: index of the target abstraction (e.g. `1 # AbstractionName2`)\n\
         - `label`: a brief label for the interaction, in just a few words.\n\
         Every abstraction should take part in at least one relationship.\n\n\
         Format the output as YAML:\n\n\
         ```yaml\n\
         summary: |\n  A brief, simple explanation of the project.\n\
         relationships:\n  \
           - from_abstraction: 0 # AbstractionName1\n    \
             to_abstraction: 1 # AbstractionName2\n    \
             label: \"Manages\"\n  \
           # ... other relationships\n\
         ```"
    )
}

fn resolve(value: Option<&serde_yaml::Value>, abstractions: &[Abstraction]) -> Option<AbstractionId> {
    match IndexRef::from_value(value?)? {
        IndexRef::Index(i) => abstractions.get(i).map(|a| a.id),
        IndexRef::Name(name) => abstractions
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(&name))
            .map(|a| a.id),
    }
}

fn describe(value: Option<&serde_yaml::Value>) -> String {
    match value {
        Some(serde_yaml::Value::String(s)) => s.trim().to_string(),
        Some(serde_yaml::Value::Number(n)) => n.to_string(),
        Some(other) => format!("{other:?}"),
        None => String::new(),
    }
}

/// Validate the analyzer's answer against the known abstractions.
///
/// A missing summary or relationship list fails the parse. Individual edges
/// that are malformed, point at unknown abstractions, loop onto themselves or
/// repeat an earlier edge are dropped and returned as warnings.
pub fn parse_graph(
    response: &str,
    abstractions: &[Abstraction],
) -> Result<(RelationshipGraph, Vec<GraphConsistencyWarning>), ParseError> {
    let value = parse_yaml(response)?;
    let map = value
        .as_mapping()
        .ok_or_else(|| ParseError::Schema("expected a YAML mapping".to_string()))?;
    let summary = required_text(map, "summary")?;
    let entries = match map.get("relationships") {
        Some(serde_yaml::Value::Sequence(entries)) => entries,
        Some(serde_yaml::Value::Null) | None => {
            return Err(ParseError::Schema("missing field `relationships`".to_string()))
        }
        Some(_) => {
            return Err(ParseError::Schema(
                "field `relationships` is not a list".to_string(),
            ))
        }
    };

    let mut edges = Vec::new();
    let mut warnings = Vec::new();
    let mut seen = HashSet::new();
    for entry in entries {
        let Some(edge) = entry.as_mapping() else {
            warnings.push(GraphConsistencyWarning {
                from: String::new(),
                to: String::new(),
                label: String::new(),
                reason: "relationship entry is not a mapping".to_string(),
            });
            continue;
        };
        let raw_from = edge.get("from_abstraction");
        let raw_to = edge.get("to_abstraction");
        let label = describe(edge.get("label"));
        let warning = |reason: &str| GraphConsistencyWarning {
            from: describe(raw_from),
            to: describe(raw_to),
            label: label.clone(),
            reason: reason.to_string(),
        };

        let (from, to) = match (resolve(raw_from, abstractions), resolve(raw_to, abstractions)) {
            (Some(from), Some(to)) => (from, to),
            _ => {
                warnings.push(warning("references an unknown abstraction"));
                continue;
            }
        };
        if label.is_empty() {
            warnings.push(warning("missing label"));
            continue;
        }
        if from == to {
            warnings.push(warning("self-referencing edge"));
            continue;
        }
        if !seen.insert((from, to, label.clone())) {
            warnings.push(warning("duplicate edge"));
            continue;
        }
        edges.push(RelationshipEdge { from, to, label });
    }

    for w in &warnings {
        warn!(from = %w.from, to = %w.to, label = %w.label, reason = %w.reason, "Dropped relationship edge");
    }
    Ok((RelationshipGraph { summary, edges }, warnings))
}

pub struct RelationshipAnalyzer {
    gateway: Arc<LlmGateway>,
}

impl RelationshipAnalyzer {
    pub fn new(gateway: Arc<LlmGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Stage<TutorialContext> for RelationshipAnalyzer {
    fn name(&self) -> &'static str {
        STAGE
    }

    async fn run(&self, ctx: TutorialContext) -> Result<TutorialContext, StageError> {
        let abstractions = ctx.abstractions()?;
        let prompt = build_prompt(ctx.project_name(), abstractions);
        debug!(prompt_chars = prompt.len(), "Built relationship prompt");

        let ((graph, warnings), reprompts) = ask_structured(
            &self.gateway,
            STAGE,
            &prompt,
            ctx.config().max_parse_retries,
            |response| parse_graph(response, abstractions),
        )
        .await?;

        info!(
            edges = graph.edges.len(),
            dropped = warnings.len(),
            reprompts,
            "Analyzed relationships"
        );
        Ok(ctx
            .with_graph(graph)?
            .with_warnings(warnings)
            .record_reprompts(STAGE, reprompts))
    }
}
