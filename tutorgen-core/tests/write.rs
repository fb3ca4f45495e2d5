mod common;

use std::collections::BTreeSet;
use tutorgen_core::config::TutorialConfig;
use tutorgen_core::context::TutorialContext;
use tutorgen_core::crawl::SourceLocator;
use tutorgen_core::flow::Stage;
use tutorgen_core::model::{
    Abstraction, AbstractionId, CrawlReport, FileRecord, RelationshipEdge, RelationshipGraph,
};
use tutorgen_core::stages::order::order_chapters;
use tutorgen_core::stages::write::{chapter_digest, mentioned_abstractions, normalise_body};
use tutorgen_core::stages::ChapterWriter;

use common::ScriptedProvider;

fn abstraction(i: usize, name: &str, files: &[usize]) -> Abstraction {
    Abstraction {
        id: AbstractionId(i),
        name: name.to_string(),
        summary: format!("{name} in a nutshell."),
        file_ids: files.iter().copied().collect(),
        discovery_index: i,
    }
}

#[test]
fn normalise_strips_fence_and_sets_heading() {
    let body = normalise_body("```markdown\n# Whatever\n\nText here.\n```", 2, "Gateway");
    assert_eq!(body, "# Chapter 2: Gateway\n\nText here.\n");

    let bare = normalise_body("Just prose.", 1, "Cache");
    assert_eq!(bare, "# Chapter 1: Cache\n\nJust prose.\n");
}

#[test]
fn digest_is_first_prose_paragraph() {
    let body = "# Chapter 1: Cache\n\nThe cache remembers\nanswers.\n\nSecond paragraph.";
    assert_eq!(chapter_digest(body, 400), "The cache remembers answers.");

    let long = format!("# T\n\n{}", "word ".repeat(200));
    let digest = chapter_digest(&long, 20);
    assert!(digest.ends_with("..."));
    assert!(digest.chars().count() <= 23);
}

#[test]
fn mentions_are_case_insensitive_whole_words() {
    let all = vec![
        abstraction(0, "Flow", &[]),
        abstraction(1, "Gateway", &[]),
        abstraction(2, "Cache", &[]),
        abstraction(3, "C++ Bridge", &[]),
    ];
    let body = "The flow hands work to the GATEWAY. Caches are not the topic. See c++ bridge.";
    let links = mentioned_abstractions(body, AbstractionId(0), &all);
    assert_eq!(
        links,
        BTreeSet::from([AbstractionId(1), AbstractionId(3)])
    );
}

#[tokio::test]
async fn chapters_follow_the_order_and_see_prior_digests() {
    let provider = ScriptedProvider::new(|prompt| {
        let name = common::concept_of(prompt);
        Ok(format!("Intro to {name}.\n\nDetails."))
    });
    let prompts = provider.prompts.clone();
    let stage = ChapterWriter::new(common::gateway(provider));

    let abstractions = vec![abstraction(0, "Flow", &[0]), abstraction(1, "Gateway", &[1])];
    let edges = vec![RelationshipEdge {
        from: AbstractionId(0),
        to: AbstractionId(1),
        label: "calls".to_string(),
    }];
    let order = order_chapters(&abstractions, &edges);

    let config = TutorialConfig::new(SourceLocator::Local("/tmp/demo".into()), "/tmp/out");
    let ctx = TutorialContext::new(config)
        .with_crawl(CrawlReport {
            files: vec![
                FileRecord {
                    path: "flow.py".into(),
                    content: "class Flow: pass".into(),
                    size: 16,
                },
                FileRecord {
                    path: "gateway.py".into(),
                    content: "class Gateway: pass".into(),
                    size: 19,
                },
            ],
            skipped: vec![],
        })
        .unwrap()
        .with_abstractions(abstractions)
        .unwrap()
        .with_graph(RelationshipGraph {
            summary: "S".into(),
            edges,
        })
        .unwrap()
        .with_order(order)
        .unwrap();

    let ctx = stage.run(ctx).await.unwrap();
    let chapters = ctx.chapters().unwrap();

    assert_eq!(chapters.len(), 2);
    assert_eq!(chapters[0].abstraction_id, AbstractionId(1));
    assert_eq!(chapters[0].file_name, "01_gateway.md");
    assert!(chapters[0].body.starts_with("# Chapter 1: Gateway\n"));
    assert_eq!(chapters[1].file_name, "02_flow.md");
    assert_eq!(chapters[1].ordinal, 2);

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("class Gateway: pass"));
    assert!(prompts[0].contains("[Flow](02_flow.md)"));
    assert!(prompts[1].contains("Chapter 1 (Gateway): Intro to Gateway."));
}
