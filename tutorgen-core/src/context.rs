//! The single value threaded through the tutorial flow.
//!
//! Each artifact slot is written once by the stage that owns it. Reading a
//! slot that has not been produced yet yields [`StageError::MissingInput`];
//! writing one twice yields [`StageError::AlreadySet`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::TutorialConfig;
use crate::error::StageError;
use crate::model::{
    Abstraction, Chapter, ChapterOrder, CrawlReport, FileRecord, GraphConsistencyWarning,
    RelationshipGraph, TutorialTree,
};

#[derive(Debug)]
pub struct TutorialContext {
    config: TutorialConfig,
    project_name: String,
    crawl: Option<CrawlReport>,
    abstractions: Option<Vec<Abstraction>>,
    graph: Option<RelationshipGraph>,
    order: Option<ChapterOrder>,
    chapters: Option<Vec<Chapter>>,
    tree: Option<TutorialTree>,
    output_path: Option<PathBuf>,
    reprompts: BTreeMap<&'static str, u32>,
    warnings: Vec<GraphConsistencyWarning>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, name: &'static str) -> Result<(), StageError> {
    if slot.is_some() {
        return Err(StageError::AlreadySet(name));
    }
    *slot = Some(value);
    Ok(())
}

impl TutorialContext {
    pub fn new(config: TutorialConfig) -> Self {
        let project_name = config.resolved_project_name();
        Self {
            config,
            project_name,
            crawl: None,
            abstractions: None,
            graph: None,
            order: None,
            chapters: None,
            tree: None,
            output_path: None,
            reprompts: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn config(&self) -> &TutorialConfig {
        &self.config
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn crawl_report(&self) -> Result<&CrawlReport, StageError> {
        self.crawl.as_ref().ok_or(StageError::MissingInput("files"))
    }

    pub fn files(&self) -> Result<&[FileRecord], StageError> {
        Ok(&self.crawl_report()?.files)
    }

    pub fn abstractions(&self) -> Result<&[Abstraction], StageError> {
        self.abstractions
            .as_deref()
            .ok_or(StageError::MissingInput("abstractions"))
    }

    pub fn graph(&self) -> Result<&RelationshipGraph, StageError> {
        self.graph
            .as_ref()
            .ok_or(StageError::MissingInput("relationships"))
    }

    pub fn order(&self) -> Result<&ChapterOrder, StageError> {
        self.order
            .as_ref()
            .ok_or(StageError::MissingInput("chapter_order"))
    }

    pub fn chapters(&self) -> Result<&[Chapter], StageError> {
        self.chapters
            .as_deref()
            .ok_or(StageError::MissingInput("chapters"))
    }

    pub fn tree(&self) -> Result<&TutorialTree, StageError> {
        self.tree.as_ref().ok_or(StageError::MissingInput("tutorial"))
    }

    pub fn output_path(&self) -> Result<&Path, StageError> {
        self.output_path
            .as_deref()
            .ok_or(StageError::MissingInput("output_path"))
    }

    pub fn with_crawl(mut self, report: CrawlReport) -> Result<Self, StageError> {
        set_once(&mut self.crawl, report, "files")?;
        Ok(self)
    }

    pub fn with_abstractions(mut self, abstractions: Vec<Abstraction>) -> Result<Self, StageError> {
        set_once(&mut self.abstractions, abstractions, "abstractions")?;
        Ok(self)
    }

    pub fn with_graph(mut self, graph: RelationshipGraph) -> Result<Self, StageError> {
        set_once(&mut self.graph, graph, "relationships")?;
        Ok(self)
    }

    pub fn with_order(mut self, order: ChapterOrder) -> Result<Self, StageError> {
        set_once(&mut self.order, order, "chapter_order")?;
        Ok(self)
    }

    pub fn with_chapters(mut self, chapters: Vec<Chapter>) -> Result<Self, StageError> {
        set_once(&mut self.chapters, chapters, "chapters")?;
        Ok(self)
    }

    pub fn with_tree(mut self, tree: TutorialTree) -> Result<Self, StageError> {
        set_once(&mut self.tree, tree, "tutorial")?;
        Ok(self)
    }

    pub fn with_output_path(mut self, path: PathBuf) -> Result<Self, StageError> {
        set_once(&mut self.output_path, path, "output_path")?;
        Ok(self)
    }

    /// Accumulate clarifying re-prompts spent by `stage`.
    pub fn record_reprompts(mut self, stage: &'static str, count: u32) -> Self {
        if count > 0 {
            *self.reprompts.entry(stage).or_insert(0) += count;
        }
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<GraphConsistencyWarning>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn reprompts(&self) -> &BTreeMap<&'static str, u32> {
        &self.reprompts
    }

    pub fn warnings(&self) -> &[GraphConsistencyWarning] {
        &self.warnings
    }
}
