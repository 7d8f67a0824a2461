use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

/// Which record-store dialect backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordStoreKind {
    /// SQL database queried with `LIKE` clauses.
    Relational,
    /// Document collection queried with regular expressions.
    Document,
}

impl FromStr for RecordStoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "relational" | "sql" | "sqlite" => Ok(Self::Relational),
            "document" => Ok(Self::Document),
            other => bail!("unknown record store `{}`", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub record_store: RecordStoreKind,
    pub upload: UploadConfig,
}

/// Settings injected into the credential issuer, orchestrator and controllers.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    pub enabled: bool,
    pub bucket: String,
    pub images_prefix: String,
    pub files_prefix: String,
    /// Region used when deriving public image URLs.
    pub aws_region: Option<String>,
    /// Region used to sign upload credentials.
    pub signing_region: String,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub presigned_url_expiry_secs: u64,
}

impl UploadConfig {
    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.presigned_url_expiry_secs)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bucket: "media-uploads".into(),
            images_prefix: "images".into(),
            files_prefix: "files".into(),
            aws_region: None,
            signing_region: "ap-southeast-2".into(),
            endpoint_url: None,
            force_path_style: false,
            presigned_url_expiry_secs: 900,
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Media upload orchestration API")]
pub struct Args {
    /// Host to bind to (overrides MEDIA_UPLOAD_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides MEDIA_UPLOAD_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides MEDIA_UPLOAD_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Record store dialect (overrides MEDIA_UPLOAD_RECORD_STORE)
    #[arg(long, value_enum)]
    pub record_store: Option<RecordStoreKind>,

    /// Target bucket for issued credentials (overrides MEDIA_UPLOAD_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Region used in public image URLs (overrides MEDIA_UPLOAD_AWS_REGION)
    #[arg(long)]
    pub aws_region: Option<String>,

    /// Disable the upload endpoint
    #[arg(long)]
    pub disable_upload: bool,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let defaults = UploadConfig::default();

        // --- Environment fallback ---
        let env_host = env::var("MEDIA_UPLOAD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("MEDIA_UPLOAD_PORT")?.unwrap_or(1337);
        let env_db = env::var("MEDIA_UPLOAD_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/media_upload.db".into());
        let env_store =
            env_parse("MEDIA_UPLOAD_RECORD_STORE")?.unwrap_or(RecordStoreKind::Relational);

        let upload = UploadConfig {
            enabled: !args.disable_upload
                && env_parse("MEDIA_UPLOAD_ENABLED")?.unwrap_or(defaults.enabled),
            bucket: args
                .bucket
                .or_else(|| env::var("MEDIA_UPLOAD_BUCKET").ok())
                .unwrap_or(defaults.bucket),
            images_prefix: env::var("MEDIA_UPLOAD_IMAGES_PREFIX")
                .unwrap_or(defaults.images_prefix),
            files_prefix: env::var("MEDIA_UPLOAD_FILES_PREFIX").unwrap_or(defaults.files_prefix),
            aws_region: args
                .aws_region
                .or_else(|| env::var("MEDIA_UPLOAD_AWS_REGION").ok())
                .filter(|r| !r.is_empty()),
            signing_region: env::var("MEDIA_UPLOAD_SIGNING_REGION")
                .unwrap_or(defaults.signing_region),
            endpoint_url: env::var("MEDIA_UPLOAD_S3_ENDPOINT").ok(),
            force_path_style: env_parse("MEDIA_UPLOAD_S3_FORCE_PATH_STYLE")?
                .unwrap_or(defaults.force_path_style),
            presigned_url_expiry_secs: env_parse("MEDIA_UPLOAD_PRESIGNED_URL_EXPIRY_SECS")?
                .unwrap_or(defaults.presigned_url_expiry_secs),
        };

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            record_store: args.record_store.unwrap_or(env_store),
            upload,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read and parse an optional environment variable.
fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
