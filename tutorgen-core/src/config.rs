use std::path::PathBuf;
use tracing::{debug, info};

use crate::crawl::SourceLocator;

/// File patterns kept when the user gives none.
pub const DEFAULT_INCLUDE_PATTERNS: &[&str] = &[
    "*.py", "*.js", "*.jsx", "*.ts", "*.tsx", "*.go", "*.java", "*.pyi", "*.pyx", "*.c", "*.cc",
    "*.cpp", "*.h", "*.rs", "*.md", "*.rst", "Dockerfile", "Makefile", "*.yaml", "*.yml",
];

/// File patterns dropped when the user gives none.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "*test*",
    "tests/*",
    "docs/*",
    "examples/*",
    "dist/*",
    "build/*",
    "target/*",
    "experimental/*",
    "deprecated/*",
    "legacy/*",
    ".git/*",
    ".github/*",
    "*.config.js",
    "*.json",
];

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100_000;
pub const DEFAULT_MAX_ABSTRACTIONS: usize = 10;
pub const DEFAULT_MAX_PARSE_RETRIES: u32 = 2;

/// How much file content the identifier may put into its single prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusBudget {
    /// Characters taken from the start of each file.
    pub max_excerpt_chars: usize,
    /// Total characters of excerpts allowed in one prompt.
    pub prompt_budget_chars: usize,
}

impl Default for CorpusBudget {
    fn default() -> Self {
        Self {
            max_excerpt_chars: 6_000,
            prompt_budget_chars: 200_000,
        }
    }
}

/// Everything a pipeline run needs besides the model gateway.
#[derive(Debug, Clone)]
pub struct TutorialConfig {
    pub source: SourceLocator,
    /// Overrides the name derived from the source locator.
    pub project_name: Option<String>,
    /// The tutorial lands in `<output_dir>/<project_name>/`.
    pub output_dir: PathBuf,
    /// Empty means every file is included.
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_file_size: u64,
    pub max_abstractions: usize,
    /// Clarifying re-prompts allowed per structured model answer.
    pub max_parse_retries: u32,
    pub corpus: CorpusBudget,
}

impl TutorialConfig {
    /// A config with the default patterns and limits.
    pub fn new(source: SourceLocator, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            project_name: None,
            output_dir: output_dir.into(),
            include_patterns: DEFAULT_INCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_abstractions: DEFAULT_MAX_ABSTRACTIONS,
            max_parse_retries: DEFAULT_MAX_PARSE_RETRIES,
            corpus: CorpusBudget::default(),
        }
    }

    pub fn resolved_project_name(&self) -> String {
        match &self.project_name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => self.source.project_name(),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            source = %self.source,
            project = %self.resolved_project_name(),
            output_dir = %self.output_dir.display(),
            include_patterns = self.include_patterns.len(),
            exclude_patterns = self.exclude_patterns.len(),
            max_file_size = self.max_file_size,
            max_abstractions = self.max_abstractions,
            "Loaded TutorialConfig"
        );
        debug!(?self, "TutorialConfig loaded (full debug)");
    }
}
