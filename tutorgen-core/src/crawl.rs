//! Repository crawling: turn a source locator into a sorted, filtered file list.
//!
//! Local trees are walked directly. Git sources are cloned into a temporary
//! directory first and then walked like a local tree; the clone is removed when
//! the crawl finishes.

use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::context::TutorialContext;
use crate::error::{CrawlError, StageError};
use crate::flow::Stage;
use crate::model::{CrawlReport, FileRecord, SkipReason, SkippedFile};

/// Where the source tree comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum SourceLocator {
    Local(PathBuf),
    Git {
        url: String,
        /// Branch, tag or commit; the remote default branch when `None`.
        reference: Option<String>,
        /// Access token for private repositories.
        token: Option<String>,
    },
}

impl SourceLocator {
    /// Name used for the output directory and the index title.
    pub fn project_name(&self) -> String {
        let name = match self {
            SourceLocator::Local(path) => {
                let resolved = path.canonicalize().unwrap_or_else(|_| path.clone());
                resolved
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            }
            SourceLocator::Git { url, .. } => {
                let location = GitLocation::parse(url);
                location
                    .clone_url
                    .trim_end_matches('/')
                    .rsplit(|c: char| c == '/' || c == ':')
                    .next()
                    .unwrap_or_default()
                    .trim_end_matches(".git")
                    .to_string()
            }
        };
        if name.is_empty() {
            "project".to_string()
        } else {
            name
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Local(path) => write!(f, "{}", path.display()),
            SourceLocator::Git { url, reference, .. } => match reference {
                Some(r) => write!(f, "{url}@{r}"),
                None => write!(f, "{url}"),
            },
        }
    }
}

// Hand-written so the token never reaches a log line.
impl fmt::Debug for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocator::Local(path) => f.debug_tuple("Local").field(path).finish(),
            SourceLocator::Git {
                url,
                reference,
                token,
            } => f
                .debug_struct("Git")
                .field("url", url)
                .field("reference", reference)
                .field("token", &token.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// A git URL split into what `git clone` needs.
///
/// Browser URLs of the form `https://github.com/<owner>/<repo>/tree/<ref>/<sub/path>`
/// are understood: the reference and sub path are taken from the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLocation {
    pub clone_url: String,
    pub reference: Option<String>,
    pub subdir: Option<String>,
}

impl GitLocation {
    pub fn parse(url: &str) -> Self {
        let trimmed = url.trim().trim_end_matches('/');
        if let Some((repo, rest)) = trimmed.split_once("/tree/") {
            let mut parts = rest.splitn(2, '/');
            let reference = parts.next().filter(|r| !r.is_empty()).map(str::to_string);
            let subdir = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
            return Self {
                clone_url: repo.to_string(),
                reference,
                subdir,
            };
        }
        Self {
            clone_url: trimmed.to_string(),
            reference: None,
            subdir: None,
        }
    }
}

/// Compiled include/exclude patterns.
///
/// A pattern matches a file if it matches the relative path or the bare file
/// name. `*` crosses directory separators, as in shell `fnmatch`.
pub struct PatternSet {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PatternSet {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, CrawlError> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_globset(include)?)
        };
        Ok(Self {
            include,
            exclude: build_globset(exclude)?,
        })
    }

    pub fn is_included(&self, rel_path: &str) -> bool {
        let name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        let included = match &self.include {
            None => true,
            Some(set) => set.is_match(rel_path) || set.is_match(name),
        };
        included && !(self.exclude.is_match(rel_path) || self.exclude.is_match(name))
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, CrawlError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| CrawlError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| CrawlError::InvalidPattern {
        pattern: patterns.join(", "),
        message: e.to_string(),
    })
}

/// Filter settings for a crawl.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_file_size: u64,
}

pub struct RepositoryCrawler {
    options: CrawlOptions,
}

impl RepositoryCrawler {
    pub fn new(options: CrawlOptions) -> Self {
        Self { options }
    }

    /// Crawl any source locator. Git sources are cloned first.
    pub async fn crawl(&self, source: &SourceLocator) -> Result<CrawlReport, CrawlError> {
        match source {
            SourceLocator::Local(path) => self.crawl_dir(path),
            SourceLocator::Git {
                url,
                reference,
                token,
            } => {
                let location = GitLocation::parse(url);
                let reference = reference.clone().or_else(|| location.reference.clone());
                let checkout =
                    clone_repository(&location.clone_url, reference.as_deref(), token.as_deref())
                        .await?;
                let root = match &location.subdir {
                    Some(sub) => checkout.path().join(sub),
                    None => checkout.path().to_path_buf(),
                };
                self.crawl_dir(&root)
            }
        }
    }

    /// Crawl a local directory.
    ///
    /// Keeps a file iff it matches an include pattern (or there are none),
    /// matches no exclude pattern, and is at most `max_file_size` bytes.
    /// Oversized and unreadable files are recorded in the report and skipped.
    pub fn crawl_dir(&self, root: &Path) -> Result<CrawlReport, CrawlError> {
        if !root.is_dir() {
            return Err(CrawlError::RootNotFound(root.to_path_buf()));
        }
        let patterns = PatternSet::new(&self.options.include, &self.options.exclude)?;
        info!(root = %root.display(), "Crawling source tree");

        let mut report = CrawlReport::default();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != ".git");

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| relative_path(root, p))
                        .unwrap_or_default();
                    warn!(path = %path, error = %e, "Skipping unreadable entry");
                    report.skipped.push(SkippedFile {
                        path,
                        reason: SkipReason::Unreadable(e.to_string()),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = relative_path(root, entry.path());
            if !patterns.is_included(&rel) {
                debug!(path = %rel, "Skipping file: does not match include/exclude patterns");
                continue;
            }

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    warn!(path = %rel, error = %e, "Skipping file: metadata unreadable");
                    report.skipped.push(SkippedFile {
                        path: rel,
                        reason: SkipReason::Unreadable(e.to_string()),
                    });
                    continue;
                }
            };
            if size > self.options.max_file_size {
                warn!(
                    path = %rel,
                    size,
                    max = self.options.max_file_size,
                    "Skipping file: size exceeds limit"
                );
                report.skipped.push(SkippedFile {
                    path: rel,
                    reason: SkipReason::TooLarge {
                        size,
                        max: self.options.max_file_size,
                    },
                });
                continue;
            }

            let content = match std::fs::read(entry.path()) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!(path = %rel, "Skipping file: not valid UTF-8");
                        report.skipped.push(SkippedFile {
                            path: rel,
                            reason: SkipReason::Unreadable("not valid UTF-8".to_string()),
                        });
                        continue;
                    }
                },
                Err(e) => {
                    warn!(path = %rel, error = %e, "Skipping file: read failed");
                    report.skipped.push(SkippedFile {
                        path: rel,
                        reason: SkipReason::Unreadable(e.to_string()),
                    });
                    continue;
                }
            };

            debug!(path = %rel, size, "Loaded file");
            report.files.push(FileRecord {
                path: rel,
                content,
                size,
            });
        }

        report.files.sort_by(|a, b| a.path.cmp(&b.path));
        info!(
            files = report.files.len(),
            skipped = report.skipped.len(),
            "Crawl complete"
        );
        Ok(report)
    }
}

fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// A cloned repository; the directory is deleted on drop.
pub struct Checkout {
    dir: TempDir,
}

impl Checkout {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// `git clone` into a fresh temp dir, then check out `reference` if given.
pub async fn clone_repository(
    url: &str,
    reference: Option<&str>,
    token: Option<&str>,
) -> Result<Checkout, CrawlError> {
    let dir = tempfile::Builder::new().prefix("tutorgen-src-").tempdir()?;
    let authed_url = with_token(url, token);

    let mut clone = Command::new("git");
    clone.arg("clone").arg("--quiet");
    if reference.is_none() {
        clone.arg("--depth").arg("1");
    }
    clone.arg(&authed_url).arg(dir.path());
    run_git(clone, url).await?;
    info!(repo_url = url, path = %dir.path().display(), "Cloned git repository");

    if let Some(reference) = reference {
        let mut checkout = Command::new("git");
        checkout
            .arg("-C")
            .arg(dir.path())
            .arg("checkout")
            .arg("--quiet")
            .arg(reference);
        run_git(checkout, url).await?;
        info!(repo_url = url, reference, "Checked out git reference");
    }

    Ok(Checkout { dir })
}

async fn run_git(mut command: Command, url: &str) -> Result<(), CrawlError> {
    let output = command.output().await.map_err(|e| CrawlError::Clone {
        url: url.to_string(),
        message: format!("failed to launch git: {e}"),
    })?;
    if output.status.success() {
        return Ok(());
    }
    Err(CrawlError::Clone {
        url: url.to_string(),
        message: format!(
            "git exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    })
}

fn with_token(url: &str, token: Option<&str>) -> String {
    match (token, url.strip_prefix("https://")) {
        (Some(token), Some(rest)) if !token.is_empty() => {
            format!("https://x-access-token:{token}@{rest}")
        }
        _ => url.to_string(),
    }
}

/// Pipeline stage wrapping [`RepositoryCrawler`].
pub struct CrawlStage;

#[async_trait]
impl Stage<TutorialContext> for CrawlStage {
    fn name(&self) -> &'static str {
        "crawl"
    }

    async fn run(&self, ctx: TutorialContext) -> Result<TutorialContext, StageError> {
        let config = ctx.config();
        let crawler = RepositoryCrawler::new(CrawlOptions {
            include: config.include_patterns.clone(),
            exclude: config.exclude_patterns.clone(),
            max_file_size: config.max_file_size,
        });
        let report = crawler.crawl(&config.source).await?;
        if report.files.is_empty() {
            return Err(CrawlError::NoFiles.into());
        }
        for skipped in &report.skipped {
            debug!(path = %skipped.path, reason = %skipped.reason, "Recorded filter warning");
        }
        ctx.with_crawl(report)
    }
}
