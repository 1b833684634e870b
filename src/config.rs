use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::cli::{Cli, CliCommand};
use crate::defect::Severity;
use crate::error::{Error, Result};
use crate::plan::PlannerRules;
use crate::strategy::StrategyRegistry;

pub const DEFAULT_CONFIG_PATH: &str = "remedy.toml";

const DEFAULT_ORACLE_URL: &str = "https://api.deepseek.com/chat/completions";
const DEFAULT_API_KEY_ENV: &str = "DEEPSEEK_API_KEY";
const DEFAULT_MODEL: &str = "deepseek-chat";
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LANGUAGE: &str = "python";
const DEFAULT_MAX_ROUNDS: u32 = 3;

const ENV_ORACLE_URL: &str = "REMEDY_ORACLE_URL";
const ENV_MODEL: &str = "REMEDY_MODEL";
const ENV_MAX_RETRIES: &str = "REMEDY_MAX_RETRIES";
const ENV_TIMEOUT: &str = "REMEDY_TIMEOUT";

/// Overrides layered over the built-in planner tables and strategy registry.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RulesConfig {
    #[serde(default)]
    pub priorities: BTreeMap<String, Severity>,
    #[serde(default)]
    pub strategies: BTreeMap<String, String>,
    /// Extra strategy ids mapped onto a built-in strategy id.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub oracle_url: Option<String>,
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub max_retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub language: Option<String>,
    pub max_rounds: Option<u32>,
    pub prompts_dir: Option<String>,
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub oracle_url: String,
    /// Name of the environment variable holding the oracle API key.
    pub api_key_env: String,
    pub model: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub language: String,
    pub max_rounds: u32,
    pub prompts_dir: Option<String>,
    pub rules: RulesConfig,
}

impl Default for Config {
    fn default() -> Self {
        layer(ConfigFile::default(), ConfigFile::default())
    }
}

impl Config {
    /// File (explicit `--config`, else `remedy.toml` if present), then
    /// environment, then CLI flags.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match cli.config {
            Some(ref path) => {
                let path = Path::new(path);
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                parse_config(&std::fs::read_to_string(path)?)?
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    parse_config(&std::fs::read_to_string(path)?)?
                } else {
                    debug!("no {DEFAULT_CONFIG_PATH} found, using defaults");
                    ConfigFile::default()
                }
            }
        };

        let env_config = env_overrides(|key| std::env::var(key).ok())?;
        Ok(merge(layer(env_config, file_config), cli))
    }

    pub fn planner_rules(&self) -> PlannerRules {
        PlannerRules::default().extend(&self.rules.priorities, &self.rules.strategies)
    }

    /// Built-in registry plus configured aliases. Aliases were validated
    /// against the built-ins when the config was parsed.
    pub fn registry(&self) -> StrategyRegistry {
        let builtin = StrategyRegistry::default();
        self.rules
            .aliases
            .iter()
            .fold(StrategyRegistry::default(), |registry, (alias, target)| {
                match builtin.resolve(target) {
                    Some(strategy) => registry.with_alias(alias, strategy),
                    None => registry,
                }
            })
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if config.max_retries == Some(0) {
        return Err(Error::ConfigValidation(
            "max_retries must be > 0".to_string(),
        ));
    }
    if config.timeout_secs == Some(0) {
        return Err(Error::ConfigValidation(
            "timeout_secs must be > 0".to_string(),
        ));
    }
    if let Some(ref language) = config.language
        && language.trim().is_empty()
    {
        return Err(Error::ConfigValidation(
            "language must not be empty".to_string(),
        ));
    }
    let builtin = StrategyRegistry::default();
    for (alias, target) in &config.rules.aliases {
        if builtin.resolve(target).is_none() {
            return Err(Error::ConfigValidation(format!(
                "alias {alias} points to unknown strategy: {target}"
            )));
        }
    }
    Ok(())
}

/// Read `REMEDY_*` overrides through `lookup`.
pub fn env_overrides<F>(lookup: F) -> Result<ConfigFile>
where
    F: Fn(&str) -> Option<String>,
{
    let number = |key: &str| -> Result<Option<u64>> {
        match lookup(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|_| {
                Error::ConfigValidation(format!("{key} must be a positive integer, got {raw:?}"))
            }),
        }
    };

    let max_retries = number(ENV_MAX_RETRIES)?
        .map(|n| {
            u32::try_from(n)
                .map_err(|_| Error::ConfigValidation(format!("{ENV_MAX_RETRIES} is too large")))
        })
        .transpose()?;

    let config = ConfigFile {
        oracle_url: lookup(ENV_ORACLE_URL),
        model: lookup(ENV_MODEL),
        max_retries,
        timeout_secs: number(ENV_TIMEOUT)?,
        ..Default::default()
    };
    validate(&config)?;
    Ok(config)
}

/// `upper` wins over `lower`, field by field; defaults fill the rest.
fn layer(upper: ConfigFile, lower: ConfigFile) -> Config {
    let mut rules = lower.rules;
    rules.priorities.extend(upper.rules.priorities);
    rules.strategies.extend(upper.rules.strategies);
    rules.aliases.extend(upper.rules.aliases);

    Config {
        oracle_url: upper
            .oracle_url
            .or(lower.oracle_url)
            .unwrap_or_else(|| DEFAULT_ORACLE_URL.to_string()),
        api_key_env: upper
            .api_key_env
            .or(lower.api_key_env)
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
        model: upper
            .model
            .or(lower.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        max_retries: upper
            .max_retries
            .or(lower.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES),
        timeout_secs: upper
            .timeout_secs
            .or(lower.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
        language: upper
            .language
            .or(lower.language)
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        max_rounds: upper
            .max_rounds
            .or(lower.max_rounds)
            .unwrap_or(DEFAULT_MAX_ROUNDS),
        prompts_dir: upper.prompts_dir.or(lower.prompts_dir),
        rules,
    }
}

pub fn merge(mut config: Config, cli: &Cli) -> Config {
    if let Some(ref language) = cli.language {
        config.language = language.clone();
    }
    if let Some(ref model) = cli.model {
        config.model = model.clone();
    }
    if let Some(retries) = cli.max_retries {
        config.max_retries = retries;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }
    if let CliCommand::Refine {
        rounds: Some(rounds),
        ..
    } = &cli.command
    {
        config.max_rounds = *rounds;
    }
    config
}
