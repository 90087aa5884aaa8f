//! CLI interface for mdkb.
//!
//! Provides command-line argument parsing using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::search::DEFAULT_SUGGESTIONS;
use crate::tags::DEFAULT_LIMIT as DEFAULT_TAG_LIMIT;

/// Default number of search results to return.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Command-line interface for mdkb.
#[derive(Parser)]
#[command(name = "mdkb")]
#[command(author, version, about = "Markdown knowledge base", long_about = None)]
pub struct Cli {
    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Search documents by relevance.
    ///
    /// Supports `"exact phrase"`, `title:word`, `tag:name`, `tag:a,b`,
    /// `tag:"exact"` and `-excluded` terms.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,

        /// Restrict to this knowledgebase ("root" or omitted means all).
        #[arg(short, long)]
        kb: Option<String>,
    },

    /// Suggest search terms starting with a prefix.
    Suggest {
        prefix: String,

        #[arg(short, long, default_value_t = DEFAULT_SUGGESTIONS)]
        limit: usize,

        #[arg(short, long)]
        kb: Option<String>,
    },

    /// List documents, newest first.
    List {
        /// Restrict to this knowledgebase.
        #[arg(short, long)]
        kb: Option<String>,
    },

    /// Print a document by its path.
    Get {
        /// Document path (e.g., "work/meeting-notes.md").
        path: String,

        /// Print only the body, without metadata.
        #[arg(long)]
        body: bool,
    },

    /// Write a document, creating or replacing it.
    Save {
        /// Filename or path (e.g., "notes.md" or "work/notes.md").
        name: String,

        /// New title; renames the file when it differs from the current one.
        #[arg(short, long)]
        title: Option<String>,

        /// Knowledgebase for names without a directory part.
        #[arg(short, long)]
        kb: Option<String>,

        /// Read content from file instead of stdin.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Create a new document with generated frontmatter.
    New {
        /// Human-readable document title.
        #[arg(short, long)]
        title: String,

        /// Comma-separated tags.
        #[arg(short = 'T', long)]
        tags: Option<String>,

        #[arg(short, long)]
        kb: Option<String>,

        /// Read body from file instead of stdin.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Back up and delete a document.
    Delete {
        /// Document path.
        path: String,
    },

    /// List knowledgebases.
    Kbs,

    /// Inspect and edit tags.
    Tags(TagsArgs),

    /// Import markdown files from a ZIP archive.
    #[command(subcommand)]
    Import(ImportCommands),

    /// Export documents to a ZIP archive with an index.
    Export {
        /// Knowledgebase to export ("root" or omitted means all).
        #[arg(short, long)]
        kb: Option<String>,

        /// Output path (default: derived from the site title and time).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start the MCP server for AI editor integration.
    #[cfg(feature = "mcp")]
    Serve,
}

#[derive(Args)]
pub struct TagsArgs {
    /// Restrict to this knowledgebase.
    #[arg(short, long, global = true)]
    pub kb: Option<String>,

    #[command(subcommand)]
    pub command: TagCommands,
}

#[derive(Subcommand)]
pub enum TagCommands {
    /// All tags with usage counts.
    List,

    /// Tags that co-occur with a tag.
    Related {
        tag: String,

        #[arg(short, long, default_value_t = DEFAULT_TAG_LIMIT)]
        limit: usize,
    },

    /// Hierarchy of `a/b` and `a:b` tags.
    Tree,

    /// Tags weighted by usage.
    Cloud,

    /// Existing tags that fit a piece of text.
    Suggest {
        /// Text to match; read from stdin when omitted.
        text: Option<String>,

        #[arg(short, long, default_value_t = DEFAULT_TAG_LIMIT)]
        limit: usize,
    },

    /// Tag usage statistics.
    Stats,

    /// Documents carrying a tag.
    Files {
        tag: String,

        /// Match the whole tag only.
        #[arg(short, long)]
        exact: bool,
    },

    /// Rename a tag in every document.
    Rename { old: String, new: String },

    /// Remove a tag from every document.
    Remove { tag: String },
}

#[derive(Subcommand)]
pub enum ImportCommands {
    /// Extract an archive and report new and conflicting files.
    Analyze {
        archive: PathBuf,

        /// Target knowledgebase (default: the archive name).
        #[arg(short, long)]
        kb: Option<String>,
    },

    /// Apply an analysed import.
    Confirm {
        /// Session id printed by `analyze`.
        session: String,

        /// Overwrite every conflicting file.
        #[arg(long)]
        overwrite_all: bool,

        /// Delete every document in the target first.
        #[arg(long)]
        remove_all: bool,

        /// Overwrite this conflicting file (repeatable).
        #[arg(long = "overwrite", value_name = "FILE")]
        overwrite: Vec<String>,
    },

    /// Analyse and confirm in one step.
    Direct {
        archive: PathBuf,

        #[arg(short, long)]
        kb: Option<String>,

        #[arg(long)]
        overwrite_all: bool,

        #[arg(long)]
        remove_all: bool,
    },

    /// Remove leftover import directories.
    Sweep,
}
