//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

/// Initialize pagewise configuration, database and documents directory
pub async fn cmd_init(options: InitOptions) -> Result<Config> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path;
    config.validate()?;
    config.save()?;

    let db = MetaDb::connect(&config).await?;
    db.init_schema().await?;
    info!("Created database at {:?}", config.paths.db_file);

    let documents_dir = config.documents_dir();
    std::fs::create_dir_all(&documents_dir)?;
    info!("Documents directory ready at {:?}", documents_dir);

    Ok(config)
}

/// Print the result of `init`
pub fn print_init(config: &Config) {
    println!("✓ Initialized pagewise at {:?}", config.paths.base_dir);
    println!("\nConfiguration: {:?}", config.paths.config_file);
    println!("Database: {:?}", config.paths.db_file);
    println!("Documents: {:?}", config.documents_dir());
    println!("\nNext steps:");
    println!("  cp book.pdf {}/        # Add a document", config.documents_dir().display());
    println!("  pagewise scan          # Register new and changed documents");
    println!("  pagewise process       # OCR queued documents page by page");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(tmp: &TempDir, force: bool) -> InitOptions {
        InitOptions {
            base_dir: tmp.path().to_path_buf(),
            config_path: tmp.path().join("config.toml"),
            force,
        }
    }

    #[tokio::test]
    async fn test_init_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let config = cmd_init(options(&tmp, false)).await.unwrap();

        assert!(config.is_initialized());
        assert!(config.documents_dir().is_dir());

        let loaded = Config::load(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(loaded.chunk.target_chars, 1000);
    }

    #[tokio::test]
    async fn test_init_refuses_overwrite_without_force() {
        let tmp = TempDir::new().unwrap();
        cmd_init(options(&tmp, false)).await.unwrap();

        assert!(cmd_init(options(&tmp, false)).await.is_err());
        assert!(cmd_init(options(&tmp, true)).await.is_ok());
    }
}
