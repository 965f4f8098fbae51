use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::crypto::random_secret;
use crate::database::storage::BlogDB;
use crate::error::AppError;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "quill_blog")]
#[command(version)]
#[command(about = "Quill blog server", long_about = None)]
pub struct Cli {
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Start the blog server (default)")]
    Serve,

    #[command(name = "init-db")]
    #[command(about = "Create the database tables and exit")]
    InitDb,

    #[command(name = "init-config")]
    #[command(about = "Write a default config file and exit")]
    InitConfig,
}

impl Cli {
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Serve)
    }
}

/// Open (and thereby migrate) the configured database.
pub fn init_db(config: &Config) -> Result<(), AppError> {
    let db = BlogDB::new(&config.paths.database_path)?;
    println!(
        "✓ Database ready at {} ({} user(s))",
        config.paths.database_path.display(),
        db.count_users()?
    );
    Ok(())
}

/// Write the default config with a fresh session secret. Refuses to
/// overwrite an existing file.
pub fn init_config(path: &Path) -> Result<(), AppError> {
    if path.exists() {
        return Err(AppError::Config(format!(
            "'{}' already exists",
            path.display()
        )));
    }
    let mut config = Config::default();
    config.server.secret_key = random_secret();
    config.save(path)?;
    println!("✓ Config written to {}", path.display());
    Ok(())
}
