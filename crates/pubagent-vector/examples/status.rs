use std::path::Path;
use std::sync::Arc;

use pubagent_core::config::IndexSettings;
use pubagent_embed::FakeEmbedder;
use pubagent_vector::table::read_manifest;
use pubagent_vector::EmbeddingIndex;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dir = std::env::args().nth(1).unwrap_or_else(|| "index_db".to_string());
    let Some(manifest) = read_manifest(Path::new(&dir))? else {
        println!("no index at {dir}");
        return Ok(());
    };
    println!("{}", serde_json::to_string_pretty(&manifest)?);

    // Row count needs an embedder with the recorded identity; the fake embedder only matches fake builds.
    let settings = IndexSettings { directory: dir.into(), ..IndexSettings::default() };
    let index = EmbeddingIndex::new(Arc::new(FakeEmbedder::new(manifest.dim)), settings);
    match index.open().await? {
        Some(opened) => println!("rows={}", opened.count_rows().await?),
        None => println!("rows=? (built by {})", manifest.embedder_id),
    }
    Ok(())
}
