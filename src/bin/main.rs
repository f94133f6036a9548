/*
 * Copyright 2019-2021 Wren Powell
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hoard_store::store::DocStore;
use hoard_store::{copy_store, DocumentId, Error, Registry};

#[derive(Parser)]
#[command(
    name = "hoard-store",
    about = "Inspect and migrate document stores",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log what the store is doing. `RUST_LOG` takes precedence.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List the documents in a store
    List(ListArgs),
    /// Show the files of one document
    Show(ShowArgs),
    /// Copy every document from one store into another
    Copy(CopyArgs),
}

#[derive(Args)]
struct ListArgs {
    /// The store, as `scheme:location`
    store: String,
}

#[derive(Args)]
struct ShowArgs {
    /// The store, as `scheme:location`
    store: String,

    /// The document ID
    id: DocumentId,
}

#[derive(Args)]
struct CopyArgs {
    /// The store to copy from, as `scheme:location`
    source: String,

    /// The store to copy into, as `scheme:location`
    target: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "hoard_store=debug"
    } else {
        "hoard_store=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .init();

    let registry = Registry::with_defaults();
    match cli.command {
        Command::List(args) => list(&registry, &args),
        Command::Show(args) => show(&registry, &args),
        Command::Copy(args) => copy(&registry, &args),
    }
}

fn open(registry: &Registry, descriptor: &str) -> anyhow::Result<Box<dyn DocStore>> {
    registry
        .open_store(descriptor)
        .with_context(|| format!("Could not open store '{}'", descriptor))
}

fn list(registry: &Registry, args: &ListArgs) -> anyhow::Result<()> {
    let store: Arc<dyn DocStore> = Arc::from(open(registry, &args.store)?);
    let cache = registry.open_cache("", Arc::clone(&store))?;

    let mut ids = store.document_ids()?.collect::<hoard_store::Result<Vec<_>>>()?;
    ids.sort();

    for id in ids {
        match cache.get_document_meta(id) {
            Ok(meta) => println!("{}\t{}\t{}", id, meta.status, meta.title),
            Err(Error::NotFound) => println!("{}\t-\t(no metadata)", id),
            Err(error) => println!("{}\t-\t(unreadable metadata: {})", id, error),
        }
    }

    Ok(())
}

fn show(registry: &Registry, args: &ShowArgs) -> anyhow::Result<()> {
    let store = open(registry, &args.store)?;
    let transaction = store.get_document(args.id)?;

    let root_files = transaction.list_root_files()?;
    let attachments = transaction.list_attachments()?;
    transaction.rollback()?;

    if root_files.is_empty() && attachments.is_empty() {
        anyhow::bail!("Document {} does not exist in '{}'", args.id, args.store);
    }

    println!("document {}", args.id);
    for name in root_files {
        println!("  {}", name);
    }
    for name in attachments {
        println!("  att/{}", name);
    }

    Ok(())
}

fn copy(registry: &Registry, args: &CopyArgs) -> anyhow::Result<()> {
    let source = open(registry, &args.source)?;
    let target = open(registry, &args.target)?;

    let copied = copy_store(target.as_ref(), source.as_ref())
        .with_context(|| format!("Could not copy '{}' into '{}'", args.source, args.target))?;
    println!("Copied {} documents.", copied);

    Ok(())
}
