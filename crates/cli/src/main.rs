//! `rpc-xml`
//!
//! Parses XML documents with the same locked-down reader the RPC protocol
//! uses and writes them back out with its writer settings. Useful for
//! checking what a service would accept and what it would send.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use helios_rpc_model::Element;
use helios_rpc_xml::egress::write_document;
use helios_rpc_xml::{Document, OutputConfig, ParserConfig, parse_document};
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(name = "rpc-xml", version, about = "Check and re-emit XML documents")]
struct Cli {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "RPC_XML_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(flatten)]
    parser: ParserConfig,

    #[command(flatten)]
    output: OutputConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Parse a document and report whether it is accepted.
    Check {
        /// Input file, or `-` for stdin.
        input: PathBuf,
    },
    /// Parse a document and write it back out.
    Format {
        /// Input file, or `-` for stdin.
        input: PathBuf,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if let Err(mut e) = self.parser.validate() {
            errors.append(&mut e);
        }
        if let Err(mut e) = self.output.validate() {
            errors.append(&mut e);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Initializes the tracing subscriber with the given default level.
/// `RUST_LOG` takes precedence when set.
fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("rpc_xml={level},helios_rpc_xml={level}"))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut bytes = Vec::new();
        io::stdin()
            .read_to_end(&mut bytes)
            .context("failed to read stdin")?;
        return Ok(bytes);
    }
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load(path: &Path, config: &ParserConfig) -> anyhow::Result<Document> {
    let bytes = read_input(path)?;
    debug!(input = %path.display(), bytes = bytes.len(), "parsing document");
    parse_document(&bytes, config).with_context(|| format!("{} was rejected", path.display()))
}

fn count_elements(element: &Element) -> usize {
    1 + element.children.iter().map(count_elements).sum::<usize>()
}

fn run(cli: &Cli, stdout: &mut dyn Write) -> anyhow::Result<()> {
    match &cli.command {
        Command::Check { input } => {
            let document = load(input, &cli.parser)?;
            writeln!(
                stdout,
                "{}: ok (root {}, {} elements)",
                input.display(),
                document.root.name,
                count_elements(&document.root)
            )?;
        }
        Command::Format { input, output } => {
            let document = load(input, &cli.parser)?;
            let bytes = write_document(
                &document.root,
                &document.processing_instructions,
                &cli.output,
                &BTreeMap::new(),
            )?;
            match output {
                Some(path) => {
                    fs::write(path, &bytes)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(output = %path.display(), bytes = bytes.len(), "document written");
                }
                None => stdout.write_all(&bytes)?,
            }
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(errors) = cli.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    run(&cli, &mut io::stdout().lock())
}
