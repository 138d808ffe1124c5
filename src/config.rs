use crate::sampler::DEFAULT_FRAME_COUNT;
use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure that can be loaded from CLI or config file
///
/// Example configuration file content
/// # Frame Sampler Configuration
///
/// # Server configuration
/// host = "127.0.0.1"
/// listen_on_port = 8000
/// workspace = "./data"
///
/// # Directory for extracted frames (a fresh temp dir when omitted)
/// temp_dir = "/var/tmp/frames"
///
/// # Sampling
/// frames = 5
/// max_upload_mb = 1024
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[serde(default)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Address to bind the HTTP listener on
    #[arg(long, default_value = "127.0.0.1")]
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Working directory, uploads are stored in `<workspace>/uploads`
    #[arg(short = 'w', long, default_value = ".")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Directory for extracted frames
    #[arg(short, long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<String>,

    /// Number of random frames extracted per upload
    #[arg(short, long, default_value_t = DEFAULT_FRAME_COUNT)]
    #[serde(default = "default_frames")]
    pub frames: usize,

    /// Maximum accepted upload size in MiB
    #[arg(short, long, default_value_t = 1024)]
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// Configuration file path
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            listen_on_port: default_port(),
            workspace: default_workspace(),
            temp_dir: None,
            frames: default_frames(),
            max_upload_mb: default_max_upload_mb(),
            config: None,
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();

        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.host == default_host() {
            self.host = file_config.host;
        }
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.frames == default_frames() {
            self.frames = file_config.frames;
        }
        if self.max_upload_mb == default_max_upload_mb() {
            self.max_upload_mb = file_config.max_upload_mb;
        }

        if self.temp_dir.is_none() {
            self.temp_dir = file_config.temp_dir;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(anyhow::anyhow!("Listen host cannot be empty"));
        }
        if self.frames == 0 {
            return Err(anyhow::anyhow!("Frame count must be at least 1"));
        }
        if self.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("Upload limit must be at least 1 MiB"));
        }
        if let Some(temp_dir) = &self.temp_dir
            && temp_dir.is_empty()
        {
            return Err(anyhow::anyhow!("Temp dir cannot be empty"));
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.listen_on_port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_frames() -> usize {
    DEFAULT_FRAME_COUNT
}

fn default_max_upload_mb() -> usize {
    1024
}
