use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "quill_blog.toml";

/// Shortest session secret `serve` accepts, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub paths: PathConfig,
    pub mail: MailConfig,
    pub site: SiteConfig,
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Secret used to derive the session cookie key.
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub database_path: PathBuf,
    pub templates_dir: PathBuf,
    pub static_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Fixed recipient of contact form submissions.
    pub recipient: String,
    pub app_password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    pub author: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub edit_authorship: EditAuthorship,
}

/// Who is recorded as a post's author after an edit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAuthorship {
    /// The editing admin becomes the author.
    #[default]
    Reassign,
    /// The original author is kept.
    Preserve,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5002,
            secret_key: String::new(),
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("posts.db"),
            templates_dir: PathBuf::from("templates"),
            static_dir: PathBuf::from("static"),
        }
    }
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            recipient: String::new(),
            app_password: String::new(),
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Quill Blog".to_string(),
            description: "A collection of random musings.".to_string(),
            author: "Quill".to_string(),
        }
    }
}

impl Config {
    /// Load the config file (if any), then `.env`, then the process environment.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("cannot read {}: {}", path.display(), e)))?;
            toml::from_str(&content)
                .map_err(|e| AppError::Config(format!("invalid {}: {}", path.display(), e)))?
        } else {
            Self::default()
        };

        dotenvy::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| AppError::Config(format!("cannot write {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Override fields from environment lookups. Takes a lookup function so
    /// tests do not have to mutate the real process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|key| lookup(key));

        if let Some(secret) = first(&["SECRET_KEY", "FLASK_SECRET"]) {
            self.server.secret_key = secret;
        }
        if let Some(uri) = first(&["DATABASE_URI", "DATABASE_URL"]) {
            self.paths.database_path = parse_database_uri(&uri)?;
        }
        if let Some(recipient) = first(&["EMAIL_RECIPIENT", "email_recipient"]) {
            self.mail.recipient = recipient;
        }
        if let Some(password) = first(&["APP_PASSWORD"]) {
            self.mail.app_password = password;
        }
        if let Some(host) = first(&["SMTP_HOST"]) {
            self.mail.smtp_host = host;
        }
        if let Some(port) = first(&["SMTP_PORT"]) {
            self.mail.smtp_port = port
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid SMTP_PORT: {}", e)))?;
        }
        if let Some(host) = first(&["SERVER_HOST"]) {
            self.server.host = host;
        }
        if let Some(port) = first(&["SERVER_PORT"]) {
            self.server.port = port
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
        }
        Ok(())
    }

    /// Settings the server cannot run without. An empty or short secret
    /// would let anyone derive the cookie key and mint sessions.
    pub fn validate(&self) -> Result<(), AppError> {
        let secret = &self.server.secret_key;
        if secret.trim().is_empty() {
            return Err(AppError::Config(
                "no session secret; set SECRET_KEY or server.secret_key".to_string(),
            ));
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Config(format!(
                "session secret must be at least {} bytes, got {}",
                MIN_SECRET_LEN,
                secret.len()
            )));
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Accepts a bare path or a `sqlite://` style URI.
pub fn parse_database_uri(uri: &str) -> Result<PathBuf, AppError> {
    let trimmed = uri.trim();
    if trimmed.is_empty() {
        return Err(AppError::Config("DATABASE_URI is empty".to_string()));
    }

    match trimmed.split_once("://") {
        None => Ok(PathBuf::from(trimmed)),
        Some(("sqlite", rest)) => {
            // sqlite:///relative.db and sqlite:////abs/path.db
            let path = rest.strip_prefix('/').unwrap_or(rest);
            if path.is_empty() {
                Err(AppError::Config(format!("no database path in {}", uri)))
            } else {
                Ok(PathBuf::from(path))
            }
        }
        Some((scheme, _)) => Err(AppError::Config(format!(
            "unsupported database scheme '{}', only sqlite is available",
            scheme
        ))),
    }
}
