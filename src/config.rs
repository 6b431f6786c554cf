use dotenv::dotenv;
use std::env;
use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub meta_app_id: String,
    pub meta_app_secret: String,
    pub bind_addr: SocketAddr,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable not found: {0}")]
    MissingEnv(String),
    #[error("Invalid database URL: {0}")]
    InvalidDatabaseUrl(String),
    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = require("DATABASE_URL")?;

        // Validate the URL format
        Url::parse(&database_url)
            .map_err(|e| ConfigError::InvalidDatabaseUrl(e.to_string()))?;

        let meta_app_id = require("META_APP_ID")?;
        let meta_app_secret = require("META_APP_SECRET")?;

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3001".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidBindAddr(e.to_string()))?;

        Ok(Self {
            database_url,
            meta_app_id,
            meta_app_secret,
            bind_addr,
        })
    }
}

fn require(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingEnv(name.to_string()))
}
