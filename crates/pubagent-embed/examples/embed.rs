use pubagent_core::config::EmbeddingSettings;
use pubagent_core::traits::Embedder;
use pubagent_embed::{cosine_similarity, get_default_embedder};

fn main() -> anyhow::Result<()> {
    let embedder = get_default_embedder(&EmbeddingSettings::default())?;
    let texts = vec!["The sky is blue.".to_string(), "What color is the sky?".to_string()];
    let embs = embedder.embed_batch(&texts)?;
    println!("model={} B={} dim={}", embedder.id(), embs.len(), embedder.dim());
    println!("similarity={:.4}", cosine_similarity(&embs[0], &embs[1]));
    Ok(())
}
