mod common;

use std::collections::BTreeSet;
use tutorgen_core::config::TutorialConfig;
use tutorgen_core::context::TutorialContext;
use tutorgen_core::crawl::SourceLocator;
use tutorgen_core::flow::Stage;
use tutorgen_core::model::{Abstraction, AbstractionId, CrawlReport};
use tutorgen_core::stages::analyze::parse_graph;
use tutorgen_core::stages::RelationshipAnalyzer;

use common::{ScriptedProvider, GRAPH_YAML};

fn abstractions() -> Vec<Abstraction> {
    ["Flow Engine", "Gateway", "Cache"]
        .iter()
        .enumerate()
        .map(|(i, name)| Abstraction {
            id: AbstractionId(i),
            name: name.to_string(),
            summary: format!("About {name}."),
            file_ids: BTreeSet::new(),
            discovery_index: i,
        })
        .collect()
}

#[test]
fn parses_summary_and_indexed_edges() {
    let (graph, warnings) = parse_graph(GRAPH_YAML, &abstractions()).unwrap();
    assert_eq!(graph.summary, "A small pipeline that talks to a model.");
    assert_eq!(graph.edges.len(), 2);
    assert_eq!(graph.edges[0].from, AbstractionId(0));
    assert_eq!(graph.edges[0].to, AbstractionId(1));
    assert_eq!(graph.edges[0].label, "Calls");
    assert!(warnings.is_empty());
}

#[test]
fn dangling_self_and_duplicate_edges_are_dropped_with_warnings() {
    let response = "```yaml
summary: Something.
relationships:
  - from_abstraction: 0 # Flow Engine
    to_abstraction: 7 # Ghost
    label: Haunts
  - from_abstraction: Unknown Thing
    to_abstraction: Gateway
    label: Uses
  - from_abstraction: 1
    to_abstraction: 1
    label: Recurses
  - from_abstraction: gateway
    to_abstraction: \"2 # Cache\"
    label: Reads
  - from_abstraction: 1 # Gateway
    to_abstraction: 2 # Cache
    label: Reads
  - from_abstraction: 2
    to_abstraction: 0
  - just a string
```";
    let known = abstractions();
    let (graph, warnings) = parse_graph(response, &known).unwrap();

    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].from, AbstractionId(1));
    assert_eq!(graph.edges[0].to, AbstractionId(2));
    assert_eq!(warnings.len(), 6);
    assert!(warnings.iter().any(|w| w.reason.contains("unknown")));
    assert!(warnings.iter().any(|w| w.reason.contains("self")));
    assert!(warnings.iter().any(|w| w.reason.contains("duplicate")));
    assert!(warnings.iter().any(|w| w.reason.contains("label")));

    for edge in &graph.edges {
        assert!(edge.from.index() < known.len());
        assert!(edge.to.index() < known.len());
    }
}

#[test]
fn missing_summary_or_relationships_is_a_parse_error() {
    let known = abstractions();
    assert!(parse_graph("```yaml\nrelationships: []\n```", &known).is_err());
    assert!(parse_graph("```yaml\nsummary: hi\n```", &known).is_err());
    assert!(parse_graph("```yaml\nsummary: hi\nrelationships: nope\n```", &known).is_err());
    assert!(parse_graph("```yaml\nsummary: hi\nrelationships: []\n```", &known).is_ok());
}

#[tokio::test]
async fn stage_stores_graph_and_warnings_in_context() {
    let provider = ScriptedProvider::new(|_| {
        Ok("```yaml\nsummary: S\nrelationships:\n  - from_abstraction: 0\n    to_abstraction: 9\n    label: x\n```".to_string())
    });
    let stage = RelationshipAnalyzer::new(common::gateway(provider));

    let config = TutorialConfig::new(SourceLocator::Local("/tmp/demo".into()), "/tmp/out");
    let ctx = TutorialContext::new(config)
        .with_crawl(CrawlReport::default())
        .unwrap()
        .with_abstractions(abstractions())
        .unwrap();

    let ctx = stage.run(ctx).await.unwrap();
    assert_eq!(ctx.graph().unwrap().summary, "S");
    assert!(ctx.graph().unwrap().edges.is_empty());
    assert_eq!(ctx.warnings().len(), 1);
    assert!(ctx.reprompts().is_empty());
}
