use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Default configuration file probed in the current directory.
pub const CONFIG_FILE: &str = ".pwgup.toml";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConnectionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Session cookie from a previous login; lets the client skip password
    /// auth while the server still honors it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UploadConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurse: Option<bool>,
}

impl AppConfig {
    pub fn load_from_file(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn generate_config_file(force: bool) -> anyhow::Result<()> {
        use std::io::Write;

        if std::path::Path::new(CONFIG_FILE).exists() && !force {
            anyhow::bail!(
                "Configuration file {} already exists. Use --force to overwrite.",
                CONFIG_FILE
            );
        }

        let config_content = Self::generate_full_config();

        let mut file = fs::File::create(CONFIG_FILE)?;
        file.write_all(config_content.as_bytes())?;

        info!("Configuration file generated: {}", CONFIG_FILE);
        info!("Please edit this file to fill in your server and credentials");
        Ok(())
    }

    pub fn generate_full_config() -> String {
        let config = AppConfig {
            connection: Some(ConnectionConfig {
                base_url: Some("http://localhost".to_string()),
                username: Some("admin".to_string()),
                password: Some("changeme".to_string()),
                cookie: None,
                timeout: Some(DEFAULT_TIMEOUT),
            }),
            upload: Some(UploadConfig {
                category: None,
                create: Some(false),
                recurse: Some(false),
            }),
        };
        let toml_content = toml::to_string_pretty(&config).unwrap();
        format!(
            "# pwgup configuration file\n# All fields are optional, command line arguments override config file values\n\n{}",
            toml_content
        )
    }
}

impl ConnectionConfig {
    /// Overlay command line arguments on top of the config file values.
    pub fn merge_cli(
        mut self,
        base_url: Option<String>,
        username: Option<String>,
        password: Option<String>,
        cookie: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        if base_url.is_some() {
            self.base_url = base_url;
        }
        if username.is_some() {
            self.username = username;
        }
        if password.is_some() {
            self.password = password;
        }
        if cookie.is_some() {
            self.cookie = cookie;
        }
        if timeout.is_some() {
            self.timeout = timeout;
        }
        if self.timeout.is_none() {
            self.timeout = Some(DEFAULT_TIMEOUT);
        }
        self
    }
}
