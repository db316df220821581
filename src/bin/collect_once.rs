//! One-shot collection: prints the report as JSON on stdout.
//!
//! Usage: collect_once <topic>... [--sources a,b] [--deadline-ms N] [--export FILE]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use intel_aggregator::config::CredentialStore;
use intel_aggregator::intel::config::IntelConfig;
use intel_aggregator::intel::export::export_report;
use intel_aggregator::intel::{Aggregator, CollectRequest, SourceId};

#[derive(Debug, Default)]
struct Args {
    topics: Vec<String>,
    sources: Option<Vec<String>>,
    deadline_ms: Option<u64>,
    export: Option<PathBuf>,
}

fn parse_args(mut it: impl Iterator<Item = String>) -> Result<Args> {
    let mut args = Args::default();
    while let Some(a) = it.next() {
        match a.as_str() {
            "--sources" => {
                let v = it.next().ok_or_else(|| anyhow!("--sources needs a value"))?;
                args.sources = Some(
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect(),
                );
            }
            "--deadline-ms" => {
                let v = it
                    .next()
                    .ok_or_else(|| anyhow!("--deadline-ms needs a value"))?;
                args.deadline_ms = Some(v.parse().with_context(|| format!("bad deadline: {v}"))?);
            }
            "--export" => {
                let v = it.next().ok_or_else(|| anyhow!("--export needs a path"))?;
                args.export = Some(PathBuf::from(v));
            }
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            _ => args.topics.push(a),
        }
    }
    if args.topics.is_empty() {
        bail!("usage: collect_once <topic>... [--sources a,b] [--deadline-ms N] [--export FILE]");
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    intel_aggregator::init_tracing();

    let args = parse_args(std::env::args().skip(1))?;
    let cfg = IntelConfig::load_default()?;
    let aggregator = Aggregator::from_config(&cfg, CredentialStore::load_default()?)?;

    let sources: Vec<SourceId> = match args.sources {
        Some(list) => list.into_iter().map(SourceId::new).collect(),
        None => aggregator.source_ids(),
    };
    let mut req = CollectRequest::new(args.topics, sources);
    if let Some(ms) = args.deadline_ms {
        req = req.with_deadline(Duration::from_millis(ms));
    }

    let report = aggregator.collect(&req).await?;
    if let Some(path) = args.export.as_deref() {
        export_report(&report, path, None)?;
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
