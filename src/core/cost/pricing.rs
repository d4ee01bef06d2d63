use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::{ensure_non_negative, AnalyticsError, Result};

/// Rough capability class of a model, used when judging substitutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Economy,
    #[default]
    Standard,
    Premium,
}

impl ModelTier {
    pub fn rank(self) -> u8 {
        match self {
            Self::Economy => 0,
            Self::Standard => 1,
            Self::Premium => 2,
        }
    }
}

/// Token pricing for one model, in dollars per 1000 tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEntry {
    pub provider: String,
    pub model: String,
    pub input_price_per_1k: f64,
    pub output_price_per_1k: f64,
    #[serde(default)]
    pub tier: ModelTier,
}

impl PricingEntry {
    pub fn new(
        provider: &str,
        model: &str,
        input_price_per_1k: f64,
        output_price_per_1k: f64,
        tier: ModelTier,
    ) -> Self {
        Self {
            provider: provider.to_lowercase(),
            model: model.to_lowercase(),
            input_price_per_1k,
            output_price_per_1k,
            tier,
        }
    }

    fn validate(&self) -> Result<()> {
        ensure_non_negative("input_price_per_1k", self.input_price_per_1k)?;
        ensure_non_negative("output_price_per_1k", self.output_price_per_1k)?;
        if self.provider.is_empty() {
            return Err(AnalyticsError::validation("provider", "empty provider name"));
        }
        Ok(())
    }
}

/// Outcome of a registry lookup. Every case must be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PricingLookup<'a> {
    Exact(&'a PricingEntry),
    ProviderDefault(&'a PricingEntry),
    NotFound,
}

/// Pricing overrides as written in a TOML pricing file.
///
/// ```toml
/// [[models]]
/// provider = "openai"
/// model = "gpt-4"
/// input_price_per_1k = 0.03
/// output_price_per_1k = 0.06
/// tier = "premium"
///
/// [[defaults]]
/// provider = "openai"
/// model = "default"
/// input_price_per_1k = 0.0025
/// output_price_per_1k = 0.01
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingFile {
    #[serde(default)]
    pub models: Vec<PricingEntry>,
    #[serde(default)]
    pub defaults: Vec<PricingEntry>,
}

/// Provider + model → price lookup with per-provider fallback entries.
#[derive(Debug, Clone, Default)]
pub struct PricingRegistry {
    models: BTreeMap<(String, String), PricingEntry>,
    defaults: BTreeMap<String, PricingEntry>,
}

impl PricingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with list prices for common hosted models.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for entry in builtin_models() {
            registry.models.insert(
                (entry.provider.clone(), entry.model.clone()),
                entry,
            );
        }
        for entry in builtin_defaults() {
            registry.defaults.insert(entry.provider.clone(), entry);
        }
        registry
    }

    pub fn insert(&mut self, entry: PricingEntry) -> Result<()> {
        let entry = PricingEntry::new(
            &entry.provider,
            &entry.model,
            entry.input_price_per_1k,
            entry.output_price_per_1k,
            entry.tier,
        );
        entry.validate()?;
        self.models
            .insert((entry.provider.clone(), entry.model.clone()), entry);
        Ok(())
    }

    pub fn set_provider_default(&mut self, entry: PricingEntry) -> Result<()> {
        let entry = PricingEntry::new(
            &entry.provider,
            &entry.model,
            entry.input_price_per_1k,
            entry.output_price_per_1k,
            entry.tier,
        );
        entry.validate()?;
        self.defaults.insert(entry.provider.clone(), entry);
        Ok(())
    }

    /// Merge a parsed pricing file over this registry; later entries win.
    pub fn apply(&mut self, file: PricingFile) -> Result<()> {
        for entry in file.models {
            self.insert(entry)?;
        }
        for entry in file.defaults {
            self.set_provider_default(entry)?;
        }
        Ok(())
    }

    /// Exact model first (raw name, then normalized), then the provider default.
    pub fn get_pricing(&self, provider: &str, model: &str) -> PricingLookup<'_> {
        match self.lookup(provider, model) {
            Some(entry) => PricingLookup::Exact(entry),
            None => match self.defaults.get(&provider.to_lowercase()) {
                Some(entry) => PricingLookup::ProviderDefault(entry),
                None => PricingLookup::NotFound,
            },
        }
    }

    /// Look up an exact model entry. Returns None if unknown.
    pub fn lookup(&self, provider: &str, model: &str) -> Option<&PricingEntry> {
        let provider = provider.to_lowercase();
        let raw = model.to_lowercase();
        if let Some(entry) = self.models.get(&(provider.clone(), raw.clone())) {
            return Some(entry);
        }
        let normalized = normalize_model(&raw);
        self.models.get(&(provider, normalized))
    }

    /// Exact lookup that reports why it failed.
    pub fn require_exact(&self, provider: &str, model: &str) -> Result<&PricingEntry> {
        if let Some(entry) = self.lookup(provider, model) {
            return Ok(entry);
        }
        if self.knows_provider(provider) {
            Err(AnalyticsError::UnknownPricing {
                provider: provider.to_string(),
                model: model.to_string(),
            })
        } else {
            Err(AnalyticsError::UnknownProvider {
                provider: provider.to_string(),
            })
        }
    }

    pub fn knows_provider(&self, provider: &str) -> bool {
        let provider = provider.to_lowercase();
        self.defaults.contains_key(&provider) || self.models.keys().any(|(p, _)| *p == provider)
    }

    /// All exact model entries, ordered by (provider, model).
    pub fn entries(&self) -> impl Iterator<Item = &PricingEntry> {
        self.models.values()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.defaults.is_empty()
    }
}

/// Normalize a model name by stripping common prefixes and suffixes.
/// Examples:
///   "anthropic.claude-sonnet-4-5-v2:0" -> "claude-sonnet-4-5"
///   "claude-sonnet-4-5-20250514" -> "claude-sonnet-4-5"
///   "models/gemini-1.5-pro" -> "gemini-1.5-pro"
pub fn normalize_model(model: &str) -> String {
    let mut name = model.trim().to_lowercase();

    for prefix in ["anthropic.", "openai/", "anthropic/", "google/", "models/"] {
        if let Some(stripped) = name.strip_prefix(prefix) {
            name = stripped.to_string();
        }
    }

    // Vertex/Bedrock suffixes like "-v2:0", ":0", "@001"
    if let Some(idx) = name.find(':') {
        name.truncate(idx);
    }
    if let Some(idx) = name.find('@') {
        name.truncate(idx);
    }
    if let Some(idx) = name.rfind("-v") {
        if idx + 2 < name.len() && name[idx + 2..].chars().all(|c| c.is_ascii_digit()) {
            name.truncate(idx);
        }
    }

    // Date suffixes: "-20250514" and "-2024-08-06"
    if name.len() > 9 && name.is_char_boundary(name.len() - 9) {
        let tail = &name[name.len() - 9..];
        if tail.starts_with('-') && tail[1..].chars().all(|c| c.is_ascii_digit()) {
            name.truncate(name.len() - 9);
        }
    }
    if name.len() > 11 && name.is_char_boundary(name.len() - 11) {
        let tail = &name[name.len() - 11..];
        let bytes = tail.as_bytes();
        let is_iso_date = bytes[0] == b'-'
            && bytes[5] == b'-'
            && bytes[8] == b'-'
            && tail
                .char_indices()
                .filter(|(i, _)| ![0, 5, 8].contains(i))
                .all(|(_, c)| c.is_ascii_digit());
        if is_iso_date {
            name.truncate(name.len() - 11);
        }
    }

    name
}

fn builtin_models() -> Vec<PricingEntry> {
    use ModelTier::*;
    vec![
        // OpenAI
        PricingEntry::new("openai", "gpt-4", 0.03, 0.06, Premium),
        PricingEntry::new("openai", "gpt-4-turbo", 0.01, 0.03, Premium),
        PricingEntry::new("openai", "gpt-4o", 0.0025, 0.01, Standard),
        PricingEntry::new("openai", "gpt-4o-mini", 0.00015, 0.0006, Economy),
        PricingEntry::new("openai", "gpt-3.5-turbo", 0.0005, 0.0015, Economy),
        PricingEntry::new("openai", "gpt-5", 0.00125, 0.01, Premium),
        PricingEntry::new("openai", "gpt-5-mini", 0.00025, 0.002, Standard),
        // Anthropic
        PricingEntry::new("anthropic", "claude-opus-4", 0.015, 0.075, Premium),
        PricingEntry::new("anthropic", "claude-opus-4-5", 0.005, 0.025, Premium),
        PricingEntry::new("anthropic", "claude-sonnet-4", 0.003, 0.015, Standard),
        PricingEntry::new("anthropic", "claude-sonnet-4-5", 0.003, 0.015, Standard),
        PricingEntry::new("anthropic", "claude-haiku-4-5", 0.001, 0.005, Economy),
        PricingEntry::new("anthropic", "claude-3-haiku", 0.00025, 0.00125, Economy),
        // Google
        PricingEntry::new("google", "gemini-1.5-pro", 0.00125, 0.005, Standard),
        PricingEntry::new("google", "gemini-1.5-flash", 0.000075, 0.0003, Economy),
        PricingEntry::new("google", "gemini-2.5-pro", 0.00125, 0.01, Premium),
    ]
}

fn builtin_defaults() -> Vec<PricingEntry> {
    use ModelTier::*;
    vec![
        PricingEntry::new("openai", "default", 0.0025, 0.01, Standard),
        PricingEntry::new("anthropic", "default", 0.003, 0.015, Standard),
        PricingEntry::new("google", "default", 0.00125, 0.005, Standard),
    ]
}
