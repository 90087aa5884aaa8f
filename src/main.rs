use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use mdkb::cli::{Cli, Commands, ImportCommands, TagCommands, TagsArgs};
use mdkb::commands;
use mdkb::corpus::DocumentSummary;
use mdkb::export::format_bytes;
use mdkb::import::ImportReport;
use mdkb::tags::TagTree;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let json = cli.json;

    match cli.command {
        Some(Commands::Search { query, limit, kb }) => {
            let hits = commands::search(&query, limit, kb.as_deref())?;
            if json {
                return print_json(&hits);
            }
            if hits.is_empty() {
                println!("No matches found for '{query}'");
                return Ok(());
            }
            for hit in &hits {
                println!("{} [{}] {}", hit.summary.path, hit.score, hit.summary.title);
                if !hit.excerpt.is_empty() {
                    println!("    {}", hit.excerpt);
                }
            }
            println!("{} result(s) found", hits.len());
            Ok(())
        }
        Some(Commands::Suggest { prefix, limit, kb }) => {
            let words = commands::suggest(&prefix, limit, kb.as_deref())?;
            if json {
                return print_json(&words);
            }
            for word in words {
                println!("{word}");
            }
            Ok(())
        }
        Some(Commands::List { kb }) => {
            let docs = commands::list(kb.as_deref())?;
            if json {
                return print_json(&docs);
            }
            print_summaries(&docs);
            Ok(())
        }
        Some(Commands::Get { path, body }) => {
            let doc = commands::get(&path)?;
            if json {
                return print_json(&doc);
            }
            print!("{}", if body { &doc.body } else { &doc.raw });
            Ok(())
        }
        Some(Commands::Save {
            name,
            title,
            kb,
            file,
        }) => {
            let content = read_content(file.as_deref())?;
            let outcome = commands::save(&name, &content, title.as_deref(), kb.as_deref())?;
            if json {
                return print_json(&outcome);
            }
            match outcome.renamed_from {
                Some(from) => println!("Saved {} (renamed from {from})", outcome.path),
                None => println!("Saved {}", outcome.path),
            }
            Ok(())
        }
        Some(Commands::New {
            title,
            tags,
            kb,
            file,
        }) => {
            let body = read_content(file.as_deref())?;
            let tags = commands::parse_tags(tags);
            let outcome = commands::create(&title, &body, &tags, kb.as_deref())?;
            if json {
                return print_json(&outcome);
            }
            println!("Created {}", outcome.path);
            Ok(())
        }
        Some(Commands::Delete { path }) => {
            commands::delete(&path)?;
            println!("Deleted {path}");
            Ok(())
        }
        Some(Commands::Kbs) => {
            let kbs = commands::knowledgebases()?;
            if json {
                return print_json(&kbs);
            }
            for kb in kbs {
                println!(
                    "{:<24} {:<24} {} document(s)",
                    kb.name, kb.display_name, kb.document_count
                );
            }
            Ok(())
        }
        Some(Commands::Tags(args)) => run_tags(args, json),
        Some(Commands::Import(command)) => run_import(command, json),
        Some(Commands::Export { kb, output }) => {
            let summary = commands::export(kb.as_deref(), output)?;
            if json {
                return print_json(&summary);
            }
            println!(
                "Exported {} document(s) ({}) to {}",
                summary.file_count,
                format_bytes(summary.total_size),
                summary.path.display()
            );
            Ok(())
        }
        #[cfg(feature = "mcp")]
        Some(Commands::Serve) => tokio::runtime::Runtime::new()?.block_on(mdkb::mcp::serve()),
        None => {
            Cli::parse_from(["mdkb", "--help"]);
            Ok(())
        }
    }
}

fn run_tags(args: TagsArgs, json: bool) -> anyhow::Result<()> {
    let kb = args.kb.as_deref();

    match args.command {
        TagCommands::List => {
            let tags = commands::tags::list(kb)?;
            if json {
                return print_json(&tags);
            }
            for t in tags {
                println!("{:>5}  {}", t.count, t.tag);
            }
        }
        TagCommands::Related { tag, limit } => {
            let tags = commands::tags::related(&tag, limit, kb)?;
            if json {
                return print_json(&tags);
            }
            for t in tags {
                println!("{:>5}  {}", t.count, t.tag);
            }
        }
        TagCommands::Tree => {
            let tree = commands::tags::tree(kb)?;
            if json {
                return print_json(&tree);
            }
            print_tree(&tree, 0);
        }
        TagCommands::Cloud => {
            let cloud = commands::tags::cloud(kb)?;
            if json {
                return print_json(&cloud);
            }
            for entry in cloud {
                println!("{:>5}  {:.2}  {}", entry.count, entry.weight, entry.tag);
            }
        }
        TagCommands::Suggest { text, limit } => {
            let text = match text {
                Some(text) => text,
                None => read_content(None)?,
            };
            let tags = commands::tags::suggest(&text, limit, kb)?;
            if json {
                return print_json(&tags);
            }
            for tag in tags {
                println!("{tag}");
            }
        }
        TagCommands::Stats => {
            let stats = commands::tags::stats(kb)?;
            if json {
                return print_json(&stats);
            }
            println!("Tags:                  {}", stats.total_tags);
            println!("Usages:                {}", stats.total_usages);
            println!("Avg per document:      {:.2}", stats.avg_tags_per_document);
            println!(
                "Most used:             {}",
                stats.most_used_tag.as_deref().unwrap_or("-")
            );
            println!(
                "Least used:            {}",
                stats.least_used_tag.as_deref().unwrap_or("-")
            );
            println!("Documents without tags: {}", stats.documents_without_tags);
        }
        TagCommands::Files { tag, exact } => {
            let docs = commands::tags::files(&tag, exact, kb)?;
            if json {
                return print_json(&docs);
            }
            for doc in docs {
                println!("{} [{}] {}", doc.summary.path, doc.score, doc.summary.title);
            }
        }
        TagCommands::Rename { old, new } => {
            let count = commands::tags::rename(&old, &new, kb)?;
            println!("Renamed '{old}' to '{new}' in {count} document(s)");
        }
        TagCommands::Remove { tag } => {
            let count = commands::tags::remove(&tag, kb)?;
            println!("Removed '{tag}' from {count} document(s)");
        }
    }

    Ok(())
}

fn run_import(command: ImportCommands, json: bool) -> anyhow::Result<()> {
    match command {
        ImportCommands::Analyze { archive, kb } => {
            let analysis = commands::import_analyze(&archive, kb.as_deref())?;
            if json {
                return print_json(&analysis);
            }
            println!("Session:       {}", analysis.session_id);
            println!("Knowledgebase: {}", analysis.knowledgebase);
            println!(
                "Files:         {} ({} new, {} conflicting)",
                analysis.total_files, analysis.new_count, analysis.conflict_count
            );
            for name in &analysis.new_files {
                println!("  new       {name}");
            }
            for conflict in &analysis.conflicts {
                println!(
                    "  conflict  {} (existing {}, incoming {})",
                    conflict.filename,
                    format_bytes(conflict.existing.size),
                    format_bytes(conflict.incoming.size)
                );
            }
            Ok(())
        }
        ImportCommands::Confirm {
            session,
            overwrite_all,
            remove_all,
            overwrite,
        } => {
            let report = commands::import_confirm(&session, overwrite_all, remove_all, overwrite)?;
            print_report(&report, json)
        }
        ImportCommands::Direct {
            archive,
            kb,
            overwrite_all,
            remove_all,
        } => {
            let report =
                commands::import_direct(&archive, kb.as_deref(), overwrite_all, remove_all)?;
            print_report(&report, json)
        }
        ImportCommands::Sweep => {
            let removed = commands::import_sweep()?;
            println!("Removed {removed} import director(ies)");
            Ok(())
        }
    }
}

fn print_report(report: &ImportReport, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(report);
    }
    println!(
        "Imported {} file(s) into {} ({} skipped, {} removed, {} failed)",
        report.imported.len(),
        report.knowledgebase,
        report.skipped.len(),
        report.removed.len(),
        report.errors.len()
    );
    for error in &report.errors {
        eprintln!("  {}: {}", error.filename, error.message);
    }
    Ok(())
}

fn print_summaries(docs: &[DocumentSummary]) {
    if docs.is_empty() {
        println!("No documents");
    }
    for doc in docs {
        let tags = if doc.tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", doc.tags.join(", "))
        };
        println!(
            "{}  {}  {}{tags}",
            doc.modified.format("%Y-%m-%d %H:%M"),
            doc.path,
            doc.title
        );
    }
}

fn print_tree(tree: &TagTree, depth: usize) {
    for (name, child) in &tree.children {
        println!("{}{name}", "  ".repeat(depth));
        print_tree(child, depth + 1);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Read content from a file, or stdin when no file is given.
fn read_content(file: Option<&Path>) -> anyhow::Result<String> {
    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        anyhow::bail!("No content given: pass --file or pipe content on stdin");
    }
    let mut content = String::new();
    stdin
        .lock()
        .read_to_string(&mut content)
        .context("Failed to read stdin")?;
    Ok(content)
}
