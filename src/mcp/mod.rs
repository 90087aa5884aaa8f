//! MCP server implementation for mdkb.
//!
//! Exposes knowledge base operations as MCP tools for AI editors.

use std::borrow::Cow;
use std::fmt::Write;

use rmcp::{
    ServerHandler, ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, ErrorCode, ErrorData as McpError, ServerCapabilities, ServerInfo,
    },
    schemars, tool, tool_handler, tool_router,
    transport::stdio,
};
use serde::Deserialize;

use crate::cli::DEFAULT_SEARCH_LIMIT;
use crate::commands;

/// Parameters for `search_knowledge` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchParams {
    #[schemars(
        description = "The search query. Supports \"phrases\", title:word, tag:name and -exclude"
    )]
    pub query: String,
    #[schemars(description = "Maximum number of results (default: 10)")]
    pub limit: Option<usize>,
    #[schemars(description = "Knowledgebase to search (default: all)")]
    pub knowledgebase: Option<String>,
}

/// Parameters for tools scoped to a knowledgebase.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ScopeParams {
    #[schemars(description = "Knowledgebase name (default: all)")]
    pub knowledgebase: Option<String>,
}

/// Parameters for `get_document` and `delete_document` tools.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct PathParams {
    #[schemars(description = "Document path (e.g., 'work/meeting-notes.md')")]
    pub path: String,
}

/// Parameters for `save_document` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SaveParams {
    #[schemars(description = "Filename or path of the document")]
    pub name: String,
    #[schemars(description = "Full markdown content, including any frontmatter")]
    pub content: String,
    #[schemars(description = "New title; renames the file when it changes")]
    pub title: Option<String>,
    #[schemars(description = "Knowledgebase for names without a directory part")]
    pub knowledgebase: Option<String>,
}

/// Parameters for `create_document` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct CreateParams {
    #[schemars(description = "Document title")]
    pub title: String,
    #[schemars(description = "Document body (markdown)")]
    pub content: String,
    #[schemars(description = "Comma-separated tags")]
    pub tags: Option<String>,
    #[schemars(description = "Target knowledgebase")]
    pub knowledgebase: Option<String>,
}

fn tool_error(action: &str, e: &anyhow::Error) -> McpError {
    McpError {
        code: ErrorCode::INTERNAL_ERROR,
        message: Cow::from(format!("{action} failed: {e}")),
        data: None,
    }
}

/// MCP server exposing mdkb tools.
#[derive(Clone)]
pub struct MdkbServer {
    tool_router: ToolRouter<Self>,
}

impl Default for MdkbServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl MdkbServer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Search documents by relevance")]
    async fn search_knowledge(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

        let results = commands::search(&params.query, limit, params.knowledgebase.as_deref())
            .map_err(|e| tool_error("Search", &e))?;

        if results.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(format!(
                "No matches found for '{}'",
                params.query
            ))]));
        }

        let mut output = String::new();
        for hit in &results {
            let _ = write!(
                output,
                "## {}\n**File:** {} (score {})\n{}\n\n",
                hit.summary.title, hit.summary.path, hit.score, hit.excerpt
            );
        }
        let _ = write!(output, "*{} result(s) found*", results.len());

        Ok(CallToolResult::success(vec![Content::text(output)]))
    }

    #[tool(description = "List documents, newest first")]
    async fn list_knowledge(
        &self,
        Parameters(params): Parameters<ScopeParams>,
    ) -> Result<CallToolResult, McpError> {
        let documents = commands::list(params.knowledgebase.as_deref())
            .map_err(|e| tool_error("List", &e))?;

        if documents.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No documents found.".to_string(),
            )]));
        }

        let mut output = String::new();
        for doc in &documents {
            let tags = if doc.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", doc.tags.join(", "))
            };
            let _ = write!(output, "- {}{}\n  `{}`\n", doc.title, tags, doc.path);
        }

        Ok(CallToolResult::success(vec![Content::text(output)]))
    }

    #[tool(description = "Get the full contents of a document by its path")]
    async fn get_document(
        &self,
        Parameters(params): Parameters<PathParams>,
    ) -> Result<CallToolResult, McpError> {
        let doc = commands::get(&params.path).map_err(|e| tool_error("Get document", &e))?;
        Ok(CallToolResult::success(vec![Content::text(doc.raw)]))
    }

    #[tool(description = "Write a document, renaming it when the title changes")]
    async fn save_document(
        &self,
        Parameters(params): Parameters<SaveParams>,
    ) -> Result<CallToolResult, McpError> {
        let outcome = commands::save(
            &params.name,
            &params.content,
            params.title.as_deref(),
            params.knowledgebase.as_deref(),
        )
        .map_err(|e| tool_error("Save", &e))?;

        let mut output = format!("Saved {} ({} bytes)", outcome.path, outcome.size);
        if let Some(from) = outcome.renamed_from {
            let _ = write!(output, ", renamed from {from}");
        }
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }

    #[tool(description = "Create a new document with title and tags")]
    async fn create_document(
        &self,
        Parameters(params): Parameters<CreateParams>,
    ) -> Result<CallToolResult, McpError> {
        let tags = commands::parse_tags(params.tags);

        let outcome = commands::create(
            &params.title,
            &params.content,
            &tags,
            params.knowledgebase.as_deref(),
        )
        .map_err(|e| tool_error("Create", &e))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Created document:\n- **Title:** {}\n- **Path:** {}",
            params.title, outcome.path
        ))]))
    }

    #[tool(description = "Back up and delete a document")]
    async fn delete_document(
        &self,
        Parameters(params): Parameters<PathParams>,
    ) -> Result<CallToolResult, McpError> {
        commands::delete(&params.path).map_err(|e| tool_error("Delete", &e))?;
        Ok(CallToolResult::success(vec![Content::text(format!(
            "Deleted {}",
            params.path
        ))]))
    }

    #[tool(description = "List tags with usage counts")]
    async fn list_tags(
        &self,
        Parameters(params): Parameters<ScopeParams>,
    ) -> Result<CallToolResult, McpError> {
        let tags = commands::tags::list(params.knowledgebase.as_deref())
            .map_err(|e| tool_error("List tags", &e))?;

        if tags.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(
                "No tags found.".to_string(),
            )]));
        }

        let mut output = String::new();
        for t in &tags {
            let _ = writeln!(output, "- {} ({})", t.tag, t.count);
        }
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }
}

#[tool_handler]
impl ServerHandler for MdkbServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "mdkb manages a markdown knowledge base. \
                Use search_knowledge to find documents, list_knowledge to browse, \
                get_document to read, save_document or create_document to write, \
                and list_tags to explore tags."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Start the MCP server with stdio transport.
///
/// # Errors
///
/// Returns an error if the server fails to start or encounters a fatal error.
pub async fn serve() -> anyhow::Result<()> {
    let server = MdkbServer::new();
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
