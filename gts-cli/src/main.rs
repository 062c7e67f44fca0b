//! Command-line entry point: thin glue over [`gts::Store`]'s operations.
#![allow(clippy::print_stdout, clippy::print_stderr, clippy::exit)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gts::{Config, FileReader, JsonschemaValidator, Store};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gts", version, about = "Global Type System toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate an instance document against its own schema.
    Validate {
        /// Files or directories to load into the store.
        paths: Vec<String>,
        /// Id of the instance to validate.
        #[arg(long)]
        instance: String,
    },
    /// Cast an instance to a different minor version of its schema.
    Cast {
        paths: Vec<String>,
        #[arg(long)]
        instance: String,
        #[arg(long)]
        target: String,
    },
    /// Report the backward/forward/full compatibility verdict between two schemas.
    Compat {
        paths: Vec<String>,
        #[arg(long)]
        a: String,
        #[arg(long)]
        b: String,
    },
    /// Run a wildcard + predicate query over the loaded entities.
    Query {
        paths: Vec<String>,
        #[arg(long)]
        expr: String,
    },
    /// Print the reference graph rooted at a schema id.
    Graph {
        paths: Vec<String>,
        #[arg(long)]
        id: String,
    },
    /// Report duplicate ids and broken references found while loading.
    Diagnostics { paths: Vec<String> },
}

fn load_store(paths: &[String]) -> Store {
    if paths.is_empty() {
        eprintln!("warning: no paths given, store will be empty");
    }
    Store::load(FileReader::new(paths.iter().cloned()), Config::default())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { paths, instance } => {
            let store = load_store(&paths);
            store
                .validate_instance(&instance, &JsonschemaValidator)
                .with_context(|| format!("validating '{instance}'"))?;
            println!("{instance}: valid");
        }
        Command::Cast { paths, instance, target } => {
            let store = load_store(&paths);
            let (document, diagnostics) = store
                .cast(&instance, &target)
                .with_context(|| format!("casting '{instance}' to '{target}'"))?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            if !diagnostics.added.is_empty() {
                eprintln!("added: {:?}", diagnostics.added);
            }
            if !diagnostics.removed.is_empty() {
                eprintln!("removed: {:?}", diagnostics.removed);
            }
        }
        Command::Compat { paths, a, b } => {
            let store = load_store(&paths);
            let verdict = store.is_minor_compatible(&a, &b).with_context(|| format!("comparing '{a}' and '{b}'"))?;
            println!("backward: {}", verdict.backward);
            println!("forward: {}", verdict.forward);
            println!("full: {}", verdict.backward && verdict.forward);
            for issue in &verdict.backward_issues {
                println!("  backward issue: {issue}");
            }
            for issue in &verdict.forward_issues {
                println!("  forward issue: {issue}");
            }
        }
        Command::Query { paths, expr } => {
            let store = load_store(&paths);
            let result = store.query(&expr).with_context(|| format!("running query '{expr}'"))?;
            println!("{} match(es)", result.count);
            for entity in &result.results {
                println!("{}", entity.id().raw);
            }
        }
        Command::Graph { paths, id } => {
            let store = load_store(&paths);
            let graph = store.build_schema_graph(&id).with_context(|| format!("building graph for '{id}'"))?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Command::Diagnostics { paths } => {
            let store = load_store(&paths);
            let diagnostics = store.diagnostics();
            for dup in &diagnostics.duplicates {
                println!("duplicate id '{}': {:?}", dup.id, dup.sources);
            }
            for broken in &diagnostics.broken_references {
                println!("broken reference '{}' -> '{}'", broken.from, broken.to);
            }
        }
    }

    Ok(())
}
