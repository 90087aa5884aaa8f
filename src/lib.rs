//! mdkb - A markdown knowledge base.
//!
//! Documents are plain markdown files with optional frontmatter, grouped into
//! knowledgebases (first-level directories of a content root). Every mutation
//! is preceded by a timestamped backup.
//!
//! # Modules
//!
//! - [`commands`] - High-level operations shared by the CLI and MCP server
//! - [`corpus`] - Document types and frontmatter handling
//! - [`storage`] - Content repository, naming rules, and backups
//! - [`search`] - Query parsing and relevance scoring
//! - [`tags`] - Tag statistics, suggestions, and bulk edits
//! - [`import`] - Two-phase ZIP import with conflict detection
//! - [`export`] - ZIP export with a generated index
//! - [`config`] - Configuration loading
//! - [`cli`] - Command-line interface definitions

pub mod cli;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod error;
pub mod export;
pub mod import;
pub mod search;
pub mod storage;
pub mod tags;

#[cfg(feature = "mcp")]
pub mod mcp;
