use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tzun_bucket::Bucket;

use super::{load_config, output};
use crate::Cli;

/// List buckets in creation order.
#[derive(Args)]
pub struct ListCommand {}

#[derive(Serialize)]
struct Summary<'a> {
    id: &'a str,
    label: &'a str,
    match_count: u64,
    examples: &'a [String],
}

impl<'a> From<&'a Bucket> for Summary<'a> {
    fn from(b: &'a Bucket) -> Self {
        Self {
            id: &b.id,
            label: &b.canonical_label,
            match_count: b.match_count,
            examples: &b.examples,
        }
    }
}

impl ListCommand {
    pub async fn run(&self, cli: &Cli) -> Result<()> {
        let store = load_config(cli)?.build_store()?;
        let (set, _) = store.load().await?;
        let summaries: Vec<Summary> = set.buckets.iter().map(Summary::from).collect();
        output(cli).write(&summaries)
    }
}
