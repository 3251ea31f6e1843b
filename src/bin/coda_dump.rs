//! coda-dump - Decode CODA/EVIO event banks
//!
//! Usage:
//!   coda-dump decode <file> [-f config.toml] [--format json|msgpack] [-o out]
//!   coda-dump summary <file>     - Count data banks per tag

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use coda_decode::common::cli::{Cli, Commands, OutputFormat};
use coda_decode::config::Config;
use coda_decode::decoder::{BankTag, CodaDecoder};
use coda_decode::evio::{ByteOrder, EventBuffer, EvioNode};
use coda_decode::output::DecodedEvent;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("coda_decode=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Decode {
            file,
            config,
            order,
            max_events,
            format,
            output,
        } => {
            let mut config = match config {
                Some(path) => Config::load(&path).with_context(|| format!("loading {}", path.display()))?,
                None => Config::default(),
            };
            if let Some(order) = order {
                config.input.byte_order = order.into();
            }
            if max_events.is_some() {
                config.input.max_events = max_events;
            }
            let writer: Box<dyn Write> = match output {
                Some(path) => Box::new(File::create(&path).with_context(|| format!("creating {}", path.display()))?),
                None => Box::new(std::io::stdout().lock()),
            };
            decode_file(&file, &config, format, BufWriter::new(writer))
        }
        Commands::Summary { file, order } => summarize_file(&file, order.into()),
    }
}

fn decode_file<W: Write>(path: &Path, config: &Config, format: OutputFormat, mut writer: W) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut decoder = CodaDecoder::new(config.decoder.clone());
    let limit = config.input.max_events.unwrap_or(u64::MAX);

    let mut events = 0u64;
    let mut records = 0usize;
    let mut diagnostics = 0usize;
    for bank in EventBuffer::new(data, config.input.byte_order) {
        if events >= limit {
            break;
        }
        let bank = bank.with_context(|| format!("event {} of {}", events, path.display()))?;
        let decoded = decoder.decode_event(bank.children());
        records += decoded.len();
        diagnostics += decoder.diagnostics().len();

        let event = DecodedEvent::from_decoder(&decoder, decoded);
        match format {
            OutputFormat::Json => writeln!(writer, "{}", event.to_json()?)?,
            OutputFormat::Msgpack => {
                event.write_frame(&mut writer)?;
            }
        }
        events += 1;
    }
    writer.flush()?;

    tracing::info!(
        events,
        records,
        diagnostics,
        timestamp_errors = decoder.timestamp_errors(),
        "Decoding finished"
    );
    Ok(())
}

fn summarize_file(path: &Path, order: ByteOrder) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let mut counts: BTreeMap<u16, u64> = BTreeMap::new();
    let mut events = 0u64;
    for bank in EventBuffer::new(data, order) {
        let bank = bank.with_context(|| format!("event {} of {}", events, path.display()))?;
        for crate_bank in bank.children() {
            for node in crate_bank.children() {
                *counts.entry(node.tag()).or_default() += 1;
            }
        }
        events += 1;
    }

    println!("File:   {}", path.display());
    println!("Events: {}", events);
    println!();
    println!("{:>8}  {:>10}  Bank", "Tag", "Count");
    for (tag, count) in counts {
        let name = BankTag::from_tag(tag)
            .map(|bank| format!("{:?}", bank))
            .unwrap_or_else(|| "-".to_string());
        println!("{:>8}  {:>10}  {}", tag, count, name);
    }
    Ok(())
}
