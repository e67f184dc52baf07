// src/config/filters.rs
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::event::Country;
use crate::filter::FilterRules;

const ENV_PATH: &str = "FILTERS_CONFIG_PATH";

/// Optional overrides; a missing list keeps the built-in default.
#[derive(Debug, Default, serde::Deserialize)]
struct RulesFile {
    #[serde(default)]
    countries: Option<Vec<String>>,
    #[serde(default)]
    keywords: Option<Vec<String>>,
}

/// Load filter rules from an explicit path. Supports TOML or JSON formats.
pub fn load_rules_from(path: &Path) -> Result<FilterRules> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading filter rules from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_rules(&content, ext.as_str())
}

/// Load rules using env var + fallbacks:
/// 1) $FILTERS_CONFIG_PATH
/// 2) config/filters.toml
/// 3) config/filters.json
/// 4) built-in defaults
pub fn load_rules_default() -> Result<FilterRules> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_rules_from(&pb);
        }
        return Err(anyhow!("FILTERS_CONFIG_PATH points to non-existent path"));
    }
    for candidate in ["config/filters.toml", "config/filters.json"] {
        let p = PathBuf::from(candidate);
        if p.exists() {
            return load_rules_from(&p);
        }
    }
    Ok(FilterRules::default())
}

fn parse_rules(s: &str, hint_ext: &str) -> Result<FilterRules> {
    let file: RulesFile = if hint_ext == "json" {
        serde_json::from_str(s).context("filter rules json")?
    } else {
        match toml::from_str(s) {
            Ok(f) => f,
            Err(toml_err) => serde_json::from_str(s)
                .map_err(|_| anyhow!("unsupported filter rules format: {toml_err}"))?,
        }
    };
    Ok(into_rules(file))
}

fn into_rules(file: RulesFile) -> FilterRules {
    let mut rules = FilterRules::default();
    if let Some(codes) = file.countries {
        let mut countries = Vec::new();
        for code in codes {
            match Country::normalize(&code) {
                Some(c) if !countries.contains(&c) => countries.push(c),
                Some(_) => {}
                None => tracing::warn!(country = %code, "ignoring unknown country in filter rules"),
            }
        }
        rules.countries = countries;
    }
    if let Some(words) = file.keywords {
        rules = rules.with_keywords(words);
    }
    rules
}
