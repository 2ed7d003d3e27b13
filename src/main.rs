//! EPUB Engine CLI
//!
//! Parses and compares CFIs, resolves them against EPUB files and maintains
//! the library catalogue.

use std::cmp::Ordering;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epub_engine::cfi::compare_cfi_strings;
use epub_engine::stream::ByteStream;
use epub_engine::{parse, Config, Library, Publication, ZipContainer};

#[derive(Debug, Parser)]
#[command(name = "epub-engine", version, about = "EPUB CFI addressing and content access")]
struct Cli {
    /// Catalogue file (overrides EPUB_ENGINE_CATALOGUE)
    #[arg(long, global = true)]
    catalogue: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a CFI and print its canonical form and structure
    Parse { cfi: String },

    /// Order two CFIs
    Compare { a: String, b: String },

    /// Resolve a CFI against an EPUB and report the addressed item
    Resolve {
        epub: PathBuf,
        cfi: String,
        /// Write the filtered item content here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Maintain the library catalogue
    #[command(subcommand)]
    Catalogue(CatalogueCommand),
}

#[derive(Debug, Subcommand)]
enum CatalogueCommand {
    /// Register every publication in an EPUB
    Add { epub: PathBuf },

    /// List known containers and their publications
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "epub_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(path) = cli.catalogue {
        config.catalogue.path = path;
    }

    match cli.command {
        Command::Parse { cfi } => {
            let parsed = parse(&cfi)?;
            println!("{}", parsed);
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Command::Compare { a, b } => {
            let ordering = compare_cfi_strings(&a, &b)?;
            println!(
                "{}",
                match ordering {
                    Ordering::Less => "before",
                    Ordering::Equal => "equal",
                    Ordering::Greater => "after",
                }
            );
        }
        Command::Resolve { epub, cfi, output } => {
            let cfi = parse(&cfi)?;
            let container = ZipContainer::open(&epub)
                .with_context(|| format!("Failed to open {}", epub.display()))?;
            let publication =
                Publication::open(Arc::new(container), &config.filters, config.decryptor())?;
            let mut addressed = publication.resolve_to_stream(&cfi)?;

            println!("item:       {}", addressed.item.id);
            println!("path:       {}", addressed.item.path);
            println!("media type: {}", addressed.item.media_type);
            println!("length:     {}", addressed.stream.length()?);
            match addressed.remainder {
                Some(ref remainder) => println!("remainder:  {}", remainder),
                None => println!("remainder:  (whole item)"),
            }

            if let Some(path) = output {
                let mut file = File::create(&path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                let written = io::copy(&mut addressed.stream, &mut file)?;
                tracing::info!("Wrote {} bytes to {}", written, path.display());
            }
        }
        Command::Catalogue(CatalogueCommand::Add { epub }) => {
            let library = Library::main(&config)?;
            let locator = epub.to_string_lossy();
            let ids = library.add_publications_in_container_at_path(&locator)?;
            library
                .write_to_file(&config.catalogue.path)
                .with_context(|| format!("Failed to write {}", config.catalogue.path.display()))?;
            for id in ids {
                println!("{}", library.epub_url_for_publication_id(&id));
            }
        }
        Command::Catalogue(CatalogueCommand::List) => {
            let library = Library::main(&config)?;
            for entry in library.catalogue_entries() {
                println!("{}", entry.locator);
                for id in entry.unique_ids {
                    println!("  {}", id);
                }
            }
        }
    }

    Ok(())
}
