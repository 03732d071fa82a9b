use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::error;

use pubagent_core::config::Settings;
use pubagent_core::corpus::{fingerprint, load_documents};
use pubagent_core::Error;
use pubagent_embed::get_default_embedder;
use pubagent_llm::get_default_generator;
use pubagent_rag::{CorpusManager, IndexState, PromptTemplate, RetrievalOrchestrator};
use pubagent_vector::EmbeddingIndex;

const EXIT_WORDS: [&str; 2] = ["exit", "quit"];

fn embedding_index(settings: &Settings) -> Result<Arc<EmbeddingIndex>> {
    let embedder = get_default_embedder(&settings.embedding).map_err(report)?;
    Ok(Arc::new(EmbeddingIndex::new(embedder, settings.index.clone())))
}

/// Log the detail, hand the user the fixed sentence.
fn report(e: Error) -> anyhow::Error {
    error!(error = %e, "operation failed");
    anyhow::anyhow!(e.user_message())
}

/// A ready pipeline, or the fixed reply when the corpus holds nothing to answer from.
enum Session {
    Ready(IndexState, RetrievalOrchestrator),
    NoDocuments(String),
}

impl Session {
    async fn answer(&self, question: &str) -> String {
        match self {
            Session::Ready(state, orchestrator) => orchestrator.answer(state, question).await,
            Session::NoDocuments(message) => message.clone(),
        }
    }
}

/// Resolve the index first; the generator and its API key are only needed
/// when there is something to answer from.
async fn session(settings: &Settings) -> Result<Session> {
    PromptTemplate::new(&settings.prompt.template, &settings.prompt.refusal).map_err(report)?;
    let index = embedding_index(settings)?;
    let manager = CorpusManager::new(index.clone(), settings).map_err(report)?;
    let state = manager.ensure_index().await.map_err(report)?;
    if state.index().is_none() {
        return Ok(Session::NoDocuments(settings.prompt.no_documents.clone()));
    }
    let generator = get_default_generator(&settings.generation)
        .map_err(report)
        .with_context(|| format!("set the {} environment variable", settings.generation.api_key_env))?;
    let orchestrator = RetrievalOrchestrator::new(index, generator, settings).map_err(report)?;
    Ok(Session::Ready(state, orchestrator))
}

pub async fn chat(settings: &Settings) -> Result<()> {
    let session = session(settings).await?;

    println!("\nRAG-based AI Publication Agent");
    println!("------------------------------");
    println!("Type 'exit' or 'quit' to exit the program.\n");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("\nEnter your question: ");
        io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!("\nGoodbye!");
            break;
        }
        let question = line.trim();
        if EXIT_WORDS.iter().any(|w| question.eq_ignore_ascii_case(w)) {
            println!("Goodbye!");
            break;
        }
        if question.is_empty() {
            continue;
        }
        println!("\nThinking...");
        let answer = session.answer(question).await;
        println!("\nAnswer: {answer}");
    }
    Ok(())
}

pub async fn ask(settings: &Settings, question: &str, show_sources: bool) -> Result<()> {
    if question.trim().is_empty() {
        anyhow::bail!("no question given");
    }
    let session = session(settings).await?;
    let Session::Ready(state, orchestrator) = &session else {
        println!("{}", session.answer(question).await);
        return Ok(());
    };
    if !show_sources {
        println!("{}", orchestrator.answer(state, question).await);
        return Ok(());
    }
    match orchestrator.try_answer(state, question).await {
        Ok(answer) => {
            println!("{}", answer.text);
            if !answer.sources.is_empty() {
                println!("\nSources:");
                for (rank, hit) in answer.sources.iter().enumerate() {
                    println!("  {}. {} #{} (score {:.3})", rank + 1, hit.source_path, hit.sequence_index, hit.score);
                }
            }
        }
        Err(e) => println!("{}", report(e)),
    }
    Ok(())
}

pub async fn index(settings: &Settings) -> Result<()> {
    let manager = CorpusManager::new(embedding_index(settings)?, settings).map_err(report)?;
    match manager.rebuild().await.map_err(report)? {
        IndexState::Ready(index) => {
            println!("Indexed {} chunks into {}", index.len(), settings.index.directory.display());
        }
        IndexState::NoDocuments => {
            println!("No documents found in {}. Please add some .txt files.", manager.directory().display());
        }
    }
    Ok(())
}

pub async fn status(settings: &Settings) -> Result<()> {
    let corpus = &settings.corpus.directory;
    let load = load_documents(corpus, &settings.corpus.extensions).map_err(report)?;
    println!("corpus:    {} ({} documents, {} skipped)", corpus.display(), load.documents.len(), load.skipped.len());
    for skipped in &load.skipped {
        println!("  skipped {}: {}", skipped.path.display(), skipped.reason);
    }

    let Some(manifest) = pubagent_vector::table::read_manifest(&settings.index.directory).map_err(report)? else {
        println!("index:     none at {}", settings.index.directory.display());
        return Ok(());
    };
    let current = manifest.corpus_fingerprint.as_deref() == Some(fingerprint(&load.documents).as_str());
    println!("index:     {}", settings.index.directory.display());
    println!("  entries:  {}", manifest.entry_count);
    println!("  embedder: {} (d={}, {})", manifest.embedder_id, manifest.dim, manifest.metric);
    println!("  built:    {}", manifest.created_at);
    println!("  corpus:   {}", if current { "up to date" } else { "changed since build" });
    if manifest.ann_index {
        println!("  ann:      IVF-PQ");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(tmp: &tempfile::TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.corpus.directory = tmp.path().join("docs");
        settings.index.directory = tmp.path().join("index_db");
        settings.embedding.use_fake = true;
        settings.embedding.fake_dim = 16;
        settings.generation.api_key_env = "PUBAGENT_CLI_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        settings
    }

    #[tokio::test]
    async fn empty_corpus_answers_without_an_api_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let settings = settings(&tmp);
        let session = session(&settings).await.unwrap();
        assert!(matches!(session, Session::NoDocuments(_)));
        assert_eq!(session.answer("anything?").await, settings.prompt.no_documents);
    }

    #[tokio::test]
    async fn missing_api_key_is_reported_once_there_are_documents() {
        let tmp = tempfile::TempDir::new().unwrap();
        let settings = settings(&tmp);
        std::fs::create_dir_all(&settings.corpus.directory).unwrap();
        std::fs::write(settings.corpus.directory.join("sky.txt"), "The sky is blue.").unwrap();
        let err = session(&settings).await.err().expect("generator needs a key");
        assert!(format!("{err:#}").contains("PUBAGENT_CLI_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
