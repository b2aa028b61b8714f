use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

const DEFAULT_SIGNING_SECRET: &str = "change-me";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Externally reachable base URL, used when signing blob URLs.
    pub public_url: String,
    pub signing_secret: String,
    /// Bucket that merged uploads land in.
    pub bucket: String,
    pub recognizer_url: String,
    pub recognizer_token: Option<String>,
    pub chat_base_url: String,
    pub chat_api_key: String,
    pub chat_model: String,
    pub notify_webhook_url: Option<String>,
    pub translation_concurrency: i64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Paper OCR + translation pipeline")]
pub struct Args {
    /// Host to bind to (overrides PAPER_PIPELINE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PAPER_PIPELINE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs are stored (overrides PAPER_PIPELINE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides PAPER_PIPELINE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public base URL for signed links (overrides PAPER_PIPELINE_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Recognition endpoint (overrides PAPER_PIPELINE_RECOGNIZER_URL)
    #[arg(long)]
    pub recognizer_url: Option<String>,

    /// Chat completion base URL (overrides PAPER_PIPELINE_CHAT_BASE_URL)
    #[arg(long)]
    pub chat_base_url: Option<String>,

    /// Chat model name (overrides PAPER_PIPELINE_CHAT_MODEL)
    #[arg(long)]
    pub chat_model: Option<String>,

    /// Global cap on concurrent translation calls (overrides PAPER_PIPELINE_TRANSLATION_CONCURRENCY)
    #[arg(long)]
    pub translation_concurrency: Option<i64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_port = env_parse("PAPER_PIPELINE_PORT", 3000u16)?;
        let env_concurrency = env_parse("PAPER_PIPELINE_TRANSLATION_CONCURRENCY", 2i64)?;
        let env_host = env_or("PAPER_PIPELINE_HOST", "0.0.0.0");
        let env_storage = env_or("PAPER_PIPELINE_STORAGE_DIR", "./data/blobs");
        let env_db = env_or(
            "PAPER_PIPELINE_DATABASE_URL",
            "sqlite://./data/meta/paper_pipeline.db",
        );

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            public_url: args.public_url.unwrap_or_else(|| {
                env_or("PAPER_PIPELINE_PUBLIC_URL", &format!("http://127.0.0.1:{}", port))
            }),
            signing_secret: env_or("PAPER_PIPELINE_SIGNING_SECRET", DEFAULT_SIGNING_SECRET),
            bucket: env_or("PAPER_PIPELINE_BUCKET", "papers"),
            recognizer_url: args.recognizer_url.unwrap_or_else(|| {
                env_or(
                    "PAPER_PIPELINE_RECOGNIZER_URL",
                    "http://127.0.0.1:8081/recognize",
                )
            }),
            recognizer_token: env::var("PAPER_PIPELINE_RECOGNIZER_TOKEN").ok(),
            chat_base_url: args.chat_base_url.unwrap_or_else(|| {
                env_or("PAPER_PIPELINE_CHAT_BASE_URL", "https://api.openai.com/v1")
            }),
            chat_api_key: env_or("PAPER_PIPELINE_CHAT_API_KEY", ""),
            chat_model: args
                .chat_model
                .unwrap_or_else(|| env_or("PAPER_PIPELINE_CHAT_MODEL", "gpt-4o-mini")),
            notify_webhook_url: env::var("PAPER_PIPELINE_NOTIFY_WEBHOOK_URL").ok(),
            translation_concurrency: args.translation_concurrency.unwrap_or(env_concurrency),
        };

        if cfg.uses_default_secret() {
            tracing::warn!(
                "PAPER_PIPELINE_SIGNING_SECRET is not set; blob URLs are signed with the built-in default"
            );
        }

        Ok((cfg, args.migrate))
    }

    /// True when blob URLs would be signed with the built-in secret.
    pub fn uses_default_secret(&self) -> bool {
        self.signing_secret == DEFAULT_SIGNING_SECRET
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Timing and sizing knobs for the pipeline stages.
///
/// Defaults are the production values; tests shrink the durations.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Expiry of the per-upload chunk lock.
    pub lock_ttl: Duration,
    /// How long `MarkChunkReceived` waits for the chunk lock.
    pub lock_wait: Duration,
    pub lock_retry: Duration,
    /// Lifetime of an async task status record.
    pub task_ttl: Duration,
    pub semaphore_name: String,
    pub translation_concurrency: i64,
    pub semaphore_poll: Duration,
    pub semaphore_wait: Duration,
    /// Word count above which a translation segment is flushed.
    pub segment_word_budget: usize,
    /// Validity of the signed URL handed to the recognizer per page.
    pub image_url_ttl: Duration,
    /// Validity of signed links to merged files.
    pub file_url_ttl: Duration,
    /// Interval between task-status polls in the paper saga.
    pub status_poll: Duration,
    pub backup_prefix: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(10),
            lock_wait: Duration::from_secs(60),
            lock_retry: Duration::from_micros(500),
            task_ttl: Duration::from_secs(60 * 60),
            semaphore_name: "translation-backend".into(),
            translation_concurrency: 2,
            semaphore_poll: Duration::from_millis(500),
            semaphore_wait: Duration::from_secs(60),
            segment_word_budget: 2000,
            image_url_ttl: Duration::from_secs(120),
            file_url_ttl: Duration::from_secs(60 * 60),
            status_poll: Duration::from_secs(1),
            backup_prefix: "backup/".into(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            translation_concurrency: cfg.translation_concurrency,
            ..Self::default()
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
