mod common;

use std::sync::atomic::Ordering;
use tutorgen_core::config::{CorpusBudget, TutorialConfig};
use tutorgen_core::context::TutorialContext;
use tutorgen_core::crawl::SourceLocator;
use tutorgen_core::error::{ParseError, StageError};
use tutorgen_core::flow::Stage;
use tutorgen_core::model::{CrawlReport, FileRecord};
use tutorgen_core::stages::identify::{excerpt, parse_abstractions, select_corpus};
use tutorgen_core::stages::AbstractionIdentifier;

use common::{ScriptedProvider, ABSTRACTIONS_YAML};

fn file(path: &str, size: usize) -> FileRecord {
    FileRecord {
        path: path.to_string(),
        content: "x".repeat(size),
        size: size as u64,
    }
}

fn context_with_files(files: Vec<FileRecord>) -> TutorialContext {
    let config = TutorialConfig::new(SourceLocator::Local("/tmp/demo".into()), "/tmp/out");
    TutorialContext::new(config)
        .with_crawl(CrawlReport {
            files,
            skipped: Vec::new(),
        })
        .unwrap()
}

fn three_files() -> Vec<FileRecord> {
    vec![file("a.py", 10), file("b.py", 10), file("c.py", 10)]
}

#[test]
fn parses_names_descriptions_and_indices() {
    let parsed = parse_abstractions(ABSTRACTIONS_YAML, 3, 10).unwrap();
    let names: Vec<&str> = parsed.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Flow Engine", "Gateway", "Cache"]);
    assert_eq!(parsed[0].file_ids.iter().copied().collect::<Vec<_>>(), vec![0]);
    assert_eq!(parsed[2].file_ids.iter().copied().collect::<Vec<_>>(), vec![1]);
    for (i, a) in parsed.iter().enumerate() {
        assert_eq!(a.id.index(), i);
        assert_eq!(a.discovery_index, i);
    }
}

#[test]
fn rejects_malformed_answers() {
    let cases = [
        ("no yaml at all: {", "invalid yaml"),
        ("```yaml\nname: not a list\n```", "not a list"),
        ("```yaml\n- name: A\n  file_indices: [0]\n```", "missing description"),
        ("```yaml\n- name: A\n  description: d\n```", "missing file_indices"),
        ("```yaml\n- name: A\n  description: d\n  file_indices: [7]\n```", "index out of range"),
        ("```yaml\n[]\n```", "empty list"),
    ];
    for (response, label) in cases {
        assert!(
            parse_abstractions(response, 3, 10).is_err(),
            "expected a parse error for case: {label}"
        );
    }
    assert_eq!(
        parse_abstractions("```yaml\n- name: A\n  description: d\n  file_indices: [7]\n```", 3, 10),
        Err(ParseError::FileIndexOutOfRange { index: 7, len: 3 })
    );
}

#[test]
fn drops_duplicates_and_entries_beyond_the_limit() {
    let response = "```yaml
- name: Parser
  description: one
  file_indices: [0]
- name: parser
  description: duplicate
  file_indices: [1]
- name: Lexer
  description: two
  file_indices: [1]
- name: Emitter
  description: three
  file_indices: [2]
```";
    let parsed = parse_abstractions(response, 3, 2).unwrap();
    let names: Vec<&str> = parsed.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["Parser", "Lexer"]);
    assert_eq!(parsed[1].id.index(), 1);
}

#[test]
fn corpus_within_budget_is_taken_whole() {
    let files = three_files();
    let budget = CorpusBudget {
        max_excerpt_chars: 100,
        prompt_budget_chars: 1_000,
    };
    assert_eq!(select_corpus(&files, &budget), vec![0, 1, 2]);
}

#[test]
fn oversized_corpus_prefers_manifests_then_larger_files() {
    let files = vec![
        file("Cargo.toml", 30),
        file("src/big.rs", 80),
        file("src/mid.rs", 50),
        file("src/small.rs", 20),
    ];
    let budget = CorpusBudget {
        max_excerpt_chars: 100,
        prompt_budget_chars: 130,
    };
    // Cargo.toml (30) + big (80) = 110; mid (50) no longer fits; small (20) does.
    let selected = select_corpus(&files, &budget);
    assert_eq!(selected, vec![0, 1, 3]);
    assert_eq!(select_corpus(&files, &budget), selected);
}

#[test]
fn excerpts_respect_char_boundaries() {
    assert_eq!(excerpt("héllo", 2), "hé");
    assert_eq!(excerpt("abc", 10), "abc");
}

#[tokio::test]
async fn malformed_then_wellformed_answer_records_one_reprompt() {
    let provider = ScriptedProvider::new(|prompt| {
        if prompt.contains("could not be used") {
            Ok(ABSTRACTIONS_YAML.to_string())
        } else {
            Ok("Sure! Here are some thoughts, but no YAML.".to_string())
        }
    });
    let calls = provider.calls.clone();
    let stage = AbstractionIdentifier::new(common::gateway(provider));

    let ctx = stage.run(context_with_files(three_files())).await.unwrap();

    assert_eq!(ctx.abstractions().unwrap().len(), 3);
    assert_eq!(ctx.reprompts().get("identify_abstractions"), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn persistent_garbage_is_fatal_after_the_reprompt_bound() {
    let provider = ScriptedProvider::new(|_| Ok("still not yaml: {".to_string()));
    let calls = provider.calls.clone();
    let stage = AbstractionIdentifier::new(common::gateway(provider));

    let err = stage.run(context_with_files(three_files())).await.unwrap_err();

    match err {
        StageError::Parse { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected a parse error, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn prompt_lists_every_file_with_its_index() {
    let provider = ScriptedProvider::new(|_| Ok(ABSTRACTIONS_YAML.to_string()));
    let prompts = provider.prompts.clone();
    let stage = AbstractionIdentifier::new(common::gateway(provider));

    stage.run(context_with_files(three_files())).await.unwrap();

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    for line in ["- 0 # a.py", "- 1 # b.py", "- 2 # c.py"] {
        assert!(prompts[0].contains(line), "prompt is missing `{line}`");
    }
}
