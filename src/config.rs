use crate::services::downloads::EngineTuning;
use serde::Deserialize;
use subsonic_client::{Credentials, SubsonicClient, SubsonicError};

fn default_client_name() -> String {
    "player-core".to_string()
}

fn default_api_version() -> String {
    "1.16.1".to_string()
}

fn default_storage_directory() -> String {
    "./state".to_string()
}

fn default_max_concurrent_downloads() -> u32 {
    3
}

fn default_max_retry_attempts() -> u32 {
    3
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(rename = "server_url")]
    pub url: String,
    #[serde(rename = "server_username")]
    pub username: String,
    #[serde(rename = "server_password")]
    pub password: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_storage_directory")]
    pub storage_directory: String,
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: u32,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(flatten)]
    pub server: ServerConfig,
}

impl Config {
    pub fn from_env() -> Self {
        match envy::from_env::<Self>() {
            Ok(config) => config,
            Err(error) => panic!("Missing environment variable: {:#?}", error),
        }
    }

    pub fn subsonic_client(&self) -> Result<SubsonicClient, SubsonicError> {
        SubsonicClient::create(
            &self.server.url,
            Credentials::Token {
                username: self.server.username.clone(),
                password: self.server.password.clone(),
            },
            &self.client_name,
            &self.api_version,
        )
    }

    pub fn engine_tuning(&self) -> EngineTuning {
        EngineTuning {
            max_concurrent_downloads: self.max_concurrent_downloads,
            max_retry_attempts: self.max_retry_attempts,
            ..EngineTuning::default()
        }
    }
}
