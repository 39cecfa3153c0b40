use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

const DEFAULT_CONFIG_FILE: &str = "claude-usage.toml";
const STATS_FILE_NAME: &str = "stats-cache.json";
const PROJECTS_DIR_NAME: &str = "projects";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub claude: ClaudeConfig,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            Self::from_file(path)?
        } else {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                Self::from_file(&default_path)?
            } else {
                Self::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self =
            toml::from_str(&contents).with_context(|| "failed to parse configuration TOML")?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = env::var("CLAUDE_USAGE_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Ok(home) = env::var("CLAUDE_CONFIG_DIR") {
            self.claude.home_dir = Some(PathBuf::from(home));
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

/// Optional overrides for where Claude Code keeps its data.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClaudeConfig {
    #[serde(default)]
    pub home_dir: Option<PathBuf>,
    #[serde(default)]
    pub projects_dir: Option<PathBuf>,
    #[serde(default)]
    pub stats_file: Option<PathBuf>,
}

/// File-system locations the usage engine reads, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePaths {
    pub projects_dir: PathBuf,
    pub stats_file: PathBuf,
}

impl EnginePaths {
    pub fn resolve(claude: &ClaudeConfig) -> Result<Self> {
        let home = match &claude.home_dir {
            Some(home) => home.clone(),
            None => dirs::home_dir()
                .map(|home| home.join(".claude"))
                .ok_or_else(|| anyhow!("unable to determine the user's home directory"))?,
        };
        Ok(Self::under(&home, claude))
    }

    fn under(home: &Path, claude: &ClaudeConfig) -> Self {
        Self {
            projects_dir: claude
                .projects_dir
                .clone()
                .unwrap_or_else(|| home.join(PROJECTS_DIR_NAME)),
            stats_file: claude
                .stats_file
                .clone()
                .unwrap_or_else(|| home.join(STATS_FILE_NAME)),
        }
    }

    /// Standard layout below a Claude home directory.
    #[cfg(test)]
    pub fn from_home(home: &Path) -> Self {
        Self::under(home, &ClaudeConfig::default())
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3001".to_string()
}
