use anyhow::Result;
use clap::Args;
use serde_json::Value;
use tzun_bucket::Bucket;

use super::{load_config, output};
use crate::Cli;

/// Show a single bucket.
#[derive(Args)]
pub struct ShowCommand {
    /// Bucket id (e.g. bucket:001)
    pub id: String,

    /// Include the representative embedding
    #[arg(long)]
    pub embedding: bool,
}

impl ShowCommand {
    pub async fn run(&self, cli: &Cli) -> Result<()> {
        let store = load_config(cli)?.build_store()?;
        let (set, _) = store.load().await?;
        let Some(bucket) = set.get(&self.id) else {
            anyhow::bail!("bucket '{}' not found", self.id);
        };
        output(cli).write(&view(bucket, self.embedding)?)
    }
}

/// The bucket as a map, with the embedding replaced by its dimension
/// unless requested.
fn view(bucket: &Bucket, with_embedding: bool) -> Result<Value> {
    let mut value = serde_json::to_value(bucket)?;
    if with_embedding {
        return Ok(value);
    }
    if let Value::Object(map) = &mut value {
        map.remove("representative_embedding");
        map.insert(
            "dimension".to_string(),
            bucket.representative_embedding.len().into(),
        );
    }
    Ok(value)
}
