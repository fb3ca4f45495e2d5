#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tutorgen_core::cache::ResponseCache;
use tutorgen_core::contract::LlmProvider;
use tutorgen_core::error::ProviderError;
use tutorgen_core::gateway::{LlmGateway, RetryPolicy};

/// Retry policy with millisecond delays so retry tests stay fast.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        call_timeout: Duration::from_secs(5),
    }
}

pub fn gateway(provider: impl LlmProvider + 'static) -> Arc<LlmGateway> {
    Arc::new(LlmGateway::new(
        Arc::new(provider),
        ResponseCache::in_memory(),
        fast_policy(),
    ))
}

/// Write `(relative path, content)` pairs below `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, content) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

type Script = dyn Fn(&str) -> Result<String, ProviderError> + Send + Sync;

/// Provider answering from a closure and recording every prompt it saw.
pub struct ScriptedProvider {
    script: Box<Script>,
    pub prompts: Arc<Mutex<Vec<String>>>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    pub fn new(script: impl Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            prompts: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.script)(prompt)
    }
}

pub const ABSTRACTIONS_YAML: &str = "```yaml
- name: Flow Engine
  description: Runs stages in order.
  file_indices:
    - 0 # src/flow.py
- name: Gateway
  description: Talks to the model.
  file_indices: [1]
- name: Cache
  description: Remembers answers.
  file_indices:
    - \"1 # src/gateway.py\"
```";

pub const GRAPH_YAML: &str = "```yaml
summary: |
  A small pipeline that talks to a model.
relationships:
  - from_abstraction: 0 # Flow Engine
    to_abstraction: 1 # Gateway
    label: Calls
  - from_abstraction: 1 # Gateway
    to_abstraction: 2 # Cache
    label: Reads
```";

/// Concept name from a chapter prompt (`about the concept: "<name>"`).
pub fn concept_of(prompt: &str) -> String {
    let marker = "about the concept: \"";
    let start = prompt.find(marker).map(|i| i + marker.len()).unwrap_or(0);
    let rest = &prompt[start..];
    rest[..rest.find('"').unwrap_or(rest.len())].to_string()
}

/// Answers every prompt of a full run with well-formed responses.
pub fn happy_script(prompt: &str) -> Result<String, ProviderError> {
    if prompt.contains("from_abstraction") {
        Ok(GRAPH_YAML.to_string())
    } else if prompt.contains("file_indices") {
        Ok(ABSTRACTIONS_YAML.to_string())
    } else {
        let name = concept_of(prompt);
        Ok(format!(
            "# {name}\n\n{name} is explained here and works with the Gateway.\n\n## Details\n\nMore text."
        ))
    }
}

/// A small source tree matching the abstractions above.
pub fn sample_project(root: &Path) {
    write_tree(
        root,
        &[
            ("src/flow.py", "class Flow:\n    pass\n"),
            ("src/gateway.py", "class Gateway:\n    pass\n"),
            ("README.md", "# Sample\n"),
            ("tests/test_flow.py", "def test(): pass\n"),
        ],
    );
}
