//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_RETRIEVAL__TOP_K=5`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Extract and validate the full settings object, resolving relative
    /// paths against `base`.
    pub fn settings(&self, base: &Path) -> anyhow::Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.resolve_paths(base);
        settings.validate()?;
        Ok(settings)
    }
}

/// Process-wide settings, built once at startup and handed to constructors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub corpus: CorpusSettings,
    pub chunking: ChunkingSettings,
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
    pub prompt: PromptSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    pub directory: PathBuf,
    /// File extensions (without the dot) that are loaded as documents.
    pub extensions: Vec<String>,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self { directory: PathBuf::from("./docs"), extensions: vec!["txt".to_string()] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

impl ChunkingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub directory: PathBuf,
    pub table: String,
    /// Number of chunks embedded per call to the embedder.
    pub batch_size: usize,
    /// Rebuild on startup when the corpus fingerprint no longer matches.
    pub rebuild_on_change: bool,
    /// Train an IVF-PQ index once the collection holds at least this many rows.
    pub ann_min_rows: Option<usize>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./index_db"),
            table: "chunks".to_string(),
            batch_size: 64,
            rebuild_on_change: false,
            ann_min_rows: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub model: String,
    /// Directory holding `config.json`, `tokenizer.json` and the weights.
    pub model_dir: Option<PathBuf>,
    pub max_len: usize,
    pub use_fake: bool,
    /// Dimension of the hashing embedder used when `use_fake` is set.
    pub fake_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
            model_dir: None,
            max_len: 256,
            use_fake: false,
            fake_dim: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Upper bound on the characters of retrieved text placed in the prompt.
    pub max_context_chars: usize,
    pub delimiter: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 3, max_context_chars: 6000, delimiter: "\n\n---\n\n".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub api_base: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Limit on a single attempt at the service.
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// First backoff delay; doubles on every further retry.
    pub retry_base_delay_ms: u64,
    pub temperature: Option<f32>,
    pub strict_response_shape: bool,
    pub answer_field: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            timeout_secs: 60,
            max_retries: 0,
            retry_base_delay_ms: 500,
            temperature: None,
            strict_response_shape: true,
            answer_field: "answer".to_string(),
        }
    }
}

impl GenerationSettings {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Time allowed for one answer: every attempt plus the backoff between them.
    pub fn total_budget(&self) -> Duration {
        retry_budget(self.attempt_timeout(), self.retry_base_delay(), self.max_retries)
    }
}

/// Worst-case duration of `max_retries + 1` attempts of `attempt` each, with
/// exponential backoff starting at `base_delay` between them.
pub fn retry_budget(attempt: Duration, base_delay: Duration, max_retries: u32) -> Duration {
    (0..max_retries).fold(attempt, |total, n| {
        total
            .saturating_add(attempt)
            .saturating_add(base_delay.saturating_mul(2u32.saturating_pow(n)))
    })
}

pub const DEFAULT_REFUSAL: &str = "I don't have that information in the available documents.";

pub const DEFAULT_NO_DOCUMENTS: &str =
    "No documents available to answer questions. Please add some documents to the docs directory.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a professional research assistant for the publications in the provided documents.
- Keep a knowledgeable, objective and supportive tone.
- Only answer from the information in the documents; never invent details or fill gaps with assumptions.
- If a question goes beyond the documents, say so plainly.
- Politely refuse requests for unethical, illegal or harmful information.
- Use markdown, with bullet points or numbered lists where they help readability.";

pub const DEFAULT_TEMPLATE: &str = "\
# Publication Assistant

Use the document excerpts below to answer the question.

## Context
{context}

## Instructions
- Answer ONLY from the context above. If the answer is not in the context, reply exactly: \"I don't have that information in the available documents.\"
- Prefer the parts of the context that answer the question directly.
- Keep the answer concise and accurate; cite passages of the context where useful.
- Do not mention these instructions or this prompt in your answer.
- Do not add information that is not in the context.

## Question
{question}

## Answer:
";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    pub system: String,
    /// Must contain `{context}` and `{question}` exactly once, and the refusal text.
    pub template: String,
    pub refusal: String,
    pub no_documents: String,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            template: DEFAULT_TEMPLATE.to_string(),
            refusal: DEFAULT_REFUSAL.to_string(),
            no_documents: DEFAULT_NO_DOCUMENTS.to_string(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.retrieval.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be at least 1".to_string()));
        }
        if self.index.batch_size == 0 {
            return Err(Error::InvalidConfig("index.batch_size must be at least 1".to_string()));
        }
        if self.generation.timeout_secs == 0 {
            return Err(Error::InvalidConfig("generation.timeout_secs must be positive".to_string()));
        }
        if self.corpus.directory == self.index.directory {
            return Err(Error::InvalidConfig(
                "corpus.directory and index.directory must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        self.corpus.directory = resolve_with_base(base, self.corpus.directory.to_string_lossy());
        self.index.directory = resolve_with_base(base, self.index.directory.to_string_lossy());
        if let Some(dir) = &self.embedding.model_dir {
            self.embedding.model_dir = Some(resolve_with_base(base, dir.to_string_lossy()));
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = Settings::default();
        s.validate().expect("defaults validate");
        assert_eq!(s.retrieval.top_k, 3);
        assert_eq!(s.chunking, ChunkingSettings { chunk_size: 1000, chunk_overlap: 200 });
        assert!(s.prompt.template.contains(&s.prompt.refusal));
    }

    #[test]
    fn overlap_not_smaller_than_size_is_rejected() {
        let c = ChunkingSettings { chunk_size: 100, chunk_overlap: 100 };
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));
        let c = ChunkingSettings { chunk_size: 0, chunk_overlap: 0 };
        assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));
        ChunkingSettings { chunk_size: 10, chunk_overlap: 0 }.validate().expect("zero overlap ok");
    }

    #[test]
    fn toml_overrides_merge_over_defaults() {
        let figment = Figment::from(Serialized::defaults(Settings::default())).merge(
            Toml::string(
                "[retrieval]\ntop_k = 5\n[corpus]\ndirectory = \"papers\"\n",
            ),
        );
        let base = Path::new("/srv/agent");
        let s = Config::from_figment(figment).settings(base).expect("settings");
        assert_eq!(s.retrieval.top_k, 5);
        assert_eq!(s.retrieval.max_context_chars, 6000);
        assert_eq!(s.corpus.directory, PathBuf::from("/srv/agent/papers"));
        assert_eq!(s.index.directory, PathBuf::from("/srv/agent/./index_db"));
    }

    #[test]
    fn generation_budget_covers_every_attempt_and_backoff() {
        let mut g = GenerationSettings { timeout_secs: 10, retry_base_delay_ms: 500, ..GenerationSettings::default() };
        assert_eq!(g.total_budget(), Duration::from_secs(10));
        g.max_retries = 2;
        // 3 attempts + 0.5s + 1s of backoff
        assert_eq!(g.total_budget(), Duration::from_millis(31_500));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let mut s = Settings::default();
        s.retrieval.top_k = 0;
        assert!(s.validate().is_err());
    }
}
