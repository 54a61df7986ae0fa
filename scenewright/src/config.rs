// src/config.rs
//
// Immutable session configuration.
//
// Everything the controller needs from the outside world is captured once
// into a SessionConfig and passed to SessionController::new. Values resolve
// with the following precedence (highest to lowest):
//
// 1. Explicit builder value
// 2. SCENEWRIGHT_* environment variable (if set and parseable)
// 3. YAML config file (SCENEWRIGHT_CONFIG_FILE or builder-supplied path)
// 4. Default

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::engine::RenderFlags;
use crate::params::ValidatorVariant;
use crate::tier::MetadataTier;

pub const ENV_METADATA_TIER: &str = "SCENEWRIGHT_METADATA_TIER";
pub const ENV_NOISE: &str = "SCENEWRIGHT_NOISE";
pub const ENV_SEED: &str = "SCENEWRIGHT_SEED";
pub const ENV_HISTORY_DIR: &str = "SCENEWRIGHT_HISTORY_DIR";
pub const ENV_TEAM: &str = "SCENEWRIGHT_TEAM";
pub const ENV_CONFIG_FILE: &str = "SCENEWRIGHT_CONFIG_FILE";

pub const DEFAULT_SCREEN_WIDTH: u32 = 600;
pub const MIN_SCREEN_WIDTH: u32 = 450;
pub const DEFAULT_HISTORY_DIR: &str = "SCENE_HISTORY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Where a resolved value came from (for the startup log line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Builder,
    Env,
    File,
    Default,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::Builder => "builder",
            ConfigSource::Env => "env",
            ConfigSource::File => "file",
            ConfigSource::Default => "default",
        }
    }
}

/// On-disk YAML configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub metadata_tier: Option<String>,
    pub validator: Option<String>,
    pub noise: Option<bool>,
    pub seed: Option<u64>,
    pub screen_width: Option<u32>,
    pub depth_masks: Option<bool>,
    pub object_masks: Option<bool>,
    pub history_enabled: Option<bool>,
    pub history_dir: Option<PathBuf>,
    pub team: Option<String>,
}

impl FileConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub metadata_tier: MetadataTier,
    pub tier_source: ConfigSource,
    pub validator: ValidatorVariant,
    pub noise: bool,
    /// Seed for the noise generator. None seeds from OS entropy.
    pub seed: Option<u64>,
    pub screen_width: u32,
    pub depth_masks: bool,
    pub object_masks: bool,
    pub history_enabled: bool,
    pub history_dir: PathBuf,
    pub team: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let tier = MetadataTier::Default;
        let flags = tier.render_flags();
        Self {
            metadata_tier: tier,
            tier_source: ConfigSource::Default,
            validator: ValidatorVariant::default(),
            noise: false,
            seed: None,
            screen_width: DEFAULT_SCREEN_WIDTH,
            depth_masks: flags.depth,
            object_masks: flags.object_mask,
            history_enabled: true,
            history_dir: PathBuf::from(DEFAULT_HISTORY_DIR),
            team: String::new(),
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Resolve from the process environment and optional config file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Screen height: two thirds of the width.
    pub fn screen_height(&self) -> u32 {
        // Two thirds of a u32 always fits back into a u32.
        (u64::from(self.screen_width) * 2 / 3) as u32
    }

    pub fn render_flags(&self) -> RenderFlags {
        RenderFlags {
            depth: self.depth_masks,
            object_mask: self.object_masks,
            consistent_colors: self.metadata_tier == MetadataTier::Oracle,
        }
    }

    /// Log the effective configuration once at startup.
    ///
    /// Format: `effective_metadata_tier=<tier> source=<source> ...`
    pub fn log_startup(&self) {
        info!(
            effective_metadata_tier = self.metadata_tier.as_str(),
            source = self.tier_source.as_str(),
            validator = self.validator.as_str(),
            noise = self.noise,
            history_enabled = self.history_enabled,
            history_dir = %self.history_dir.display(),
            "session config resolved"
        );
    }
}

/// Explicit overrides; anything left unset falls through to env, file, default.
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    metadata_tier: Option<MetadataTier>,
    validator: Option<ValidatorVariant>,
    noise: Option<bool>,
    seed: Option<u64>,
    screen_width: Option<u32>,
    depth_masks: Option<bool>,
    object_masks: Option<bool>,
    history_enabled: Option<bool>,
    history_dir: Option<PathBuf>,
    team: Option<String>,
    config_file: Option<PathBuf>,
    file: Option<FileConfig>,
}

impl SessionConfigBuilder {
    pub fn metadata_tier(mut self, tier: MetadataTier) -> Self {
        self.metadata_tier = Some(tier);
        self
    }

    pub fn validator(mut self, variant: ValidatorVariant) -> Self {
        self.validator = Some(variant);
        self
    }

    pub fn noise(mut self, enabled: bool) -> Self {
        self.noise = Some(enabled);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn screen_width(mut self, width: u32) -> Self {
        self.screen_width = Some(width);
        self
    }

    pub fn depth_masks(mut self, enabled: bool) -> Self {
        self.depth_masks = Some(enabled);
        self
    }

    pub fn object_masks(mut self, enabled: bool) -> Self {
        self.object_masks = Some(enabled);
        self
    }

    pub fn history_enabled(mut self, enabled: bool) -> Self {
        self.history_enabled = Some(enabled);
        self
    }

    pub fn history_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.history_dir = Some(dir.into());
        self
    }

    pub fn team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    /// YAML file to read (overrides SCENEWRIGHT_CONFIG_FILE).
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Already-parsed file contents (skips reading any file).
    pub fn file_config(mut self, file: FileConfig) -> Self {
        self.file = Some(file);
        self
    }

    /// Resolve against the process environment.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        self.build_with_env(|key| std::env::var(key).ok())
    }

    /// Resolve against an arbitrary environment lookup.
    pub fn build_with_env<F>(self, env: F) -> Result<SessionConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let file = match self.file {
            Some(file) => file,
            None => match self
                .config_file
                .clone()
                .or_else(|| env(ENV_CONFIG_FILE).map(PathBuf::from))
            {
                Some(path) => FileConfig::load(&path)?,
                None => FileConfig::default(),
            },
        };

        let file_tier = file
            .metadata_tier
            .as_deref()
            .map(|s| {
                MetadataTier::parse(s)
                    .ok_or_else(|| ConfigError::Invalid(format!("metadata_tier {s:?}")))
            })
            .transpose()?;
        let file_validator = file
            .validator
            .as_deref()
            .map(|s| {
                ValidatorVariant::parse(s)
                    .ok_or_else(|| ConfigError::Invalid(format!("validator {s:?}")))
            })
            .transpose()?;

        let (metadata_tier, tier_source) = resolve(
            self.metadata_tier,
            env(ENV_METADATA_TIER),
            ENV_METADATA_TIER,
            MetadataTier::parse,
            file_tier,
            MetadataTier::Default,
        );
        let (noise, _) = resolve(
            self.noise,
            env(ENV_NOISE),
            ENV_NOISE,
            parse_bool,
            file.noise,
            false,
        );
        let (seed, _) = resolve(
            self.seed.map(Some),
            env(ENV_SEED),
            ENV_SEED,
            |s| s.trim().parse::<u64>().ok().map(Some),
            file.seed.map(Some),
            None,
        );
        let (history_dir, _) = resolve(
            self.history_dir,
            env(ENV_HISTORY_DIR),
            ENV_HISTORY_DIR,
            |s| Some(PathBuf::from(s)),
            file.history_dir,
            PathBuf::from(DEFAULT_HISTORY_DIR),
        );
        let (team, _) = resolve(
            self.team,
            env(ENV_TEAM),
            ENV_TEAM,
            |s| Some(s.trim().to_string()),
            file.team,
            String::new(),
        );

        let mut screen_width = self
            .screen_width
            .or(file.screen_width)
            .unwrap_or(DEFAULT_SCREEN_WIDTH);
        if screen_width < MIN_SCREEN_WIDTH {
            warn!(
                screen_width,
                min = MIN_SCREEN_WIDTH,
                "screen width below minimum; using minimum"
            );
            screen_width = MIN_SCREEN_WIDTH;
        }

        let flags = metadata_tier.render_flags();
        Ok(SessionConfig {
            metadata_tier,
            tier_source,
            validator: self.validator.or(file_validator).unwrap_or_default(),
            noise,
            seed,
            screen_width,
            depth_masks: self.depth_masks.or(file.depth_masks).unwrap_or(flags.depth),
            object_masks: self
                .object_masks
                .or(file.object_masks)
                .unwrap_or(flags.object_mask),
            history_enabled: self
                .history_enabled
                .or(file.history_enabled)
                .unwrap_or(true),
            history_dir,
            team,
        })
    }
}

/// Apply builder > env > file > default for one value.
///
/// A set but unparseable env value is warned about and ignored.
fn resolve<T>(
    explicit: Option<T>,
    env_value: Option<String>,
    env_key: &str,
    parse: impl Fn(&str) -> Option<T>,
    file: Option<T>,
    default: T,
) -> (T, ConfigSource) {
    if let Some(v) = explicit {
        return (v, ConfigSource::Builder);
    }
    if let Some(raw) = env_value {
        match parse(&raw) {
            Some(v) => return (v, ConfigSource::Env),
            None => warn!(key = env_key, value = %raw, "invalid environment value; ignoring"),
        }
    }
    if let Some(v) = file {
        return (v, ConfigSource::File);
    }
    (default, ConfigSource::Default)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
