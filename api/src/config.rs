use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub database_path: String,
    pub default_per_page: u32,
    pub max_per_page: u32,
}

impl ServerConfig {
    /// Load config from a specific .env file, or the default `.env` if None.
    pub fn from_env_file(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => {
                dotenvy::from_filename(p).with_context(|| format!("Load env file: {p}"))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let config = Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("PORT must be a valid u16")?,
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/parameters.db".to_string()),
            default_per_page: std::env::var("DEFAULT_PER_PAGE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DEFAULT_PER_PAGE must be a valid u32")?,
            max_per_page: std::env::var("MAX_PER_PAGE")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .context("MAX_PER_PAGE must be a valid u32")?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.default_per_page == 0 {
            anyhow::bail!("DEFAULT_PER_PAGE must be greater than zero");
        }
        if self.max_per_page < self.default_per_page {
            anyhow::bail!(
                "MAX_PER_PAGE ({}) must be at least DEFAULT_PER_PAGE ({})",
                self.max_per_page,
                self.default_per_page
            );
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 3000,
            database_path: "data/parameters.db".to_string(),
            default_per_page: 20,
            max_per_page: 1000,
        }
    }
}
