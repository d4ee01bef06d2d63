use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::anomaly::AnomalyConfig;
use crate::core::cost::pricing::{PricingFile, PricingRegistry};
use crate::core::models::budget::{default_alert_threshold, Budget, BudgetPeriod};
use crate::core::recommend::RecommendationConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid pricing file: {0}")]
    PricingError(#[from] crate::core::error::AnalyticsError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_format")]
    pub default_format: String,
    #[serde(default = "default_color")]
    pub color: String,
    /// TOML file with pricing overrides merged over the built-in table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_file: Option<PathBuf>,
}

fn default_format() -> String {
    "text".to_string()
}
fn default_color() -> String {
    "auto".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            color: default_color(),
            pricing_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub amount: f64,
    #[serde(default)]
    pub period: BudgetPeriod,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
}

impl BudgetConfig {
    pub fn for_owner(&self, owner_id: &str) -> Budget {
        Budget {
            owner_id: owner_id.to_string(),
            amount: self.amount,
            period: self.period,
            alert_threshold: self.alert_threshold,
        }
    }
}

/// Thresholds handed to the analytics kernel on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    pub anomaly: AnomalyConfig,
    pub recommendations: RecommendationConfig,
    /// How many models a report lists
    pub top_models: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            anomaly: AnomalyConfig::default(),
            recommendations: RecommendationConfig::default(),
            top_models: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetConfig>,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub recommendations: RecommendationConfig,
}

impl AppConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("tkc").join("config.toml")
    }

    /// Load config from the default path, falling back to defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to the config file path.
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn analytics(&self) -> AnalyticsConfig {
        AnalyticsConfig {
            anomaly: self.anomaly.clone(),
            recommendations: self.recommendations.clone(),
            ..AnalyticsConfig::default()
        }
    }

    /// Built-in pricing with the configured overrides file merged in.
    pub fn pricing_registry(&self) -> Result<PricingRegistry, ConfigError> {
        let mut registry = PricingRegistry::builtin();
        if let Some(path) = &self.settings.pricing_file {
            let content = std::fs::read_to_string(path)?;
            let file: PricingFile = toml::from_str(&content)?;
            registry.apply(file)?;
        }
        Ok(registry)
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !["text", "json"].contains(&self.settings.default_format.as_str()) {
            issues.push(format!(
                "Invalid default_format: '{}' (must be 'text' or 'json')",
                self.settings.default_format
            ));
        }
        if !["auto", "always", "never"].contains(&self.settings.color.as_str()) {
            issues.push(format!(
                "Invalid color: '{}' (must be 'auto', 'always', or 'never')",
                self.settings.color
            ));
        }
        if let Some(path) = &self.settings.pricing_file {
            if !path.exists() {
                issues.push(format!("Pricing file not found: {}", path.display()));
            }
        }
        if let Some(budget) = &self.budget {
            if let Err(e) = crate::core::budget::evaluate_budget(budget.amount, budget.alert_threshold, 0.0) {
                issues.push(format!("Budget: {}", e));
            }
        }
        if let Err(e) = self.anomaly.validate() {
            issues.push(format!("Anomaly: {}", e));
        }
        if let Err(e) = self.recommendations.validate() {
            issues.push(format!("Recommendations: {}", e));
        }
        issues
    }
}
