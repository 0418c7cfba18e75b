//! Configuration management for Academy Sync

use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the PostgREST/Supabase project
    pub url: String,
    /// Project API key, sent as `apikey`
    pub api_key: String,
    /// User access token; the API key is used as bearer when absent
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3030,
            },
            database: DatabaseConfig {
                url: "sqlite:./academy.db".to_string(),
            },
            remote: RemoteConfig {
                url: "http://localhost:54321".to_string(),
                api_key: String::new(),
                access_token: None,
                timeout_secs: 30,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3030".to_string())
                    .parse()
                    .unwrap_or(3030),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./academy.db".to_string()),
            },
            remote: RemoteConfig {
                url: env::var("REMOTE_URL")?,
                api_key: env::var("REMOTE_API_KEY")?,
                access_token: env::var("REMOTE_ACCESS_TOKEN").ok(),
                timeout_secs: env::var("REMOTE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            },
        })
    }
}
