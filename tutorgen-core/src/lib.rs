#![doc = "tutorgen-core: core logic library for tutorgen."]

//! This crate contains the tutorial generation pipeline: data model, model
//! gateway, repository crawler, flow engine and the six pipeline stages.
//! Provider integrations and the command line live in the `tutorgen` crate.
//!
//! # Usage
//! Build an [`gateway::LlmGateway`] around any [`contract::LlmProvider`], then
//! call [`pipeline::generate_tutorial`] with a [`config::TutorialConfig`].

pub mod cache;
pub mod config;
pub mod context;
pub mod contract;
pub mod crawl;
pub mod error;
pub mod flow;
pub mod gateway;
pub mod model;
pub mod pipeline;
pub mod response;
pub mod stages;
