use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf};
use uuid::Uuid;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub assets_root: PathBuf,
    pub staging_dir: PathBuf,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub s3_cf_distribution: Option<String>,
    pub ffprobe_path: String,
}

// The JWT secret never reaches the logs.
impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("jwt_secret", &"<redacted>")
            .field("assets_root", &self.assets_root)
            .field("staging_dir", &self.staging_dir)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_cf_distribution", &self.s3_cf_distribution)
            .field("ffprobe_path", &self.ffprobe_path)
            .finish()
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Authenticated video upload service")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_UPLOAD_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_UPLOAD_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides VIDEO_UPLOAD_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory served under /assets (overrides VIDEO_UPLOAD_ASSETS_ROOT)
    #[arg(long)]
    pub assets_root: Option<PathBuf>,

    /// Directory for staging uploads (overrides VIDEO_UPLOAD_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Target bucket (overrides VIDEO_UPLOAD_S3_BUCKET)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// Bucket region (overrides VIDEO_UPLOAD_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Custom endpoint for S3-compatible providers (overrides VIDEO_UPLOAD_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// CDN base URL used for video links (overrides VIDEO_UPLOAD_S3_CF_DISTRIBUTION)
    #[arg(long)]
    pub s3_cf_distribution: Option<String>,

    /// ffprobe executable (overrides VIDEO_UPLOAD_FFPROBE_PATH)
    #[arg(long)]
    pub ffprobe_path: Option<String>,

    /// Run migrations and exit
    #[arg(long, conflicts_with = "issue_token")]
    pub migrate: bool,

    /// Print a one-hour access token for USER_ID and exit
    #[arg(long, value_name = "USER_ID")]
    pub issue_token: Option<Uuid>,
}

/// What the binary should do once configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Serve,
    Migrate,
    IssueToken(Uuid),
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        let command = match (args.migrate, args.issue_token) {
            (_, Some(user_id)) => Command::IssueToken(user_id),
            (true, None) => Command::Migrate,
            (false, None) => Command::Serve,
        };
        Ok((Self::from_args(args)?, command))
    }

    fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("VIDEO_UPLOAD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("VIDEO_UPLOAD_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing VIDEO_UPLOAD_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 8091,
            Err(err) => return Err(err).context("reading VIDEO_UPLOAD_PORT"),
        };
        let env_db = env::var("VIDEO_UPLOAD_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/videos.db".into());
        let env_assets = env::var("VIDEO_UPLOAD_ASSETS_ROOT").unwrap_or_else(|_| "./assets".into());
        let env_staging = env::var_os("VIDEO_UPLOAD_STAGING_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(env::temp_dir);
        let env_region = env::var("VIDEO_UPLOAD_S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let env_ffprobe =
            env::var("VIDEO_UPLOAD_FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".into());

        let jwt_secret = env::var("VIDEO_UPLOAD_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() {
            bail!("VIDEO_UPLOAD_JWT_SECRET must be set");
        }

        let s3_bucket = args
            .s3_bucket
            .or_else(|| env::var("VIDEO_UPLOAD_S3_BUCKET").ok())
            .filter(|bucket| !bucket.is_empty())
            .context("VIDEO_UPLOAD_S3_BUCKET must be set")?;

        // --- Merge ---
        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or(env_db),
            jwt_secret,
            assets_root: args.assets_root.unwrap_or_else(|| env_assets.into()),
            staging_dir: args.staging_dir.unwrap_or(env_staging),
            s3_bucket,
            s3_region: args.s3_region.unwrap_or(env_region),
            s3_endpoint: args
                .s3_endpoint
                .or_else(|| non_empty_env("VIDEO_UPLOAD_S3_ENDPOINT")),
            s3_cf_distribution: args
                .s3_cf_distribution
                .or_else(|| non_empty_env("VIDEO_UPLOAD_S3_CF_DISTRIBUTION")),
            ffprobe_path: args.ffprobe_path.unwrap_or(env_ffprobe),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}
