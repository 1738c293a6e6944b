use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::graph::ClassGraph;
use crate::patterns::PackagePatterns;

pub const CONFIG_ENV: &str = "CLASS_SHADE_CONFIG";

/// Package sets are dotted names (`com.example` or `com.example.Main`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShadeConfig {
    pub keep_packages: BTreeSet<String>,
    pub unshaded_packages: BTreeSet<String>,
    pub ignore_packages: BTreeSet<String>,
    pub shadow_package: String,
}

impl ShadeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn class_graph(&self) -> ClassGraph {
        ClassGraph::new(
            PackagePatterns::new(&self.keep_packages),
            PackagePatterns::new(&self.unshaded_packages),
            PackagePatterns::new(&self.ignore_packages),
            &self.shadow_package,
        )
    }
}

pub fn resolve_config_path(cli: &Cli) -> Option<PathBuf> {
    if let Some(p) = cli.config.clone() {
        return Some(p);
    }
    env::var_os(CONFIG_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// File (or `CLASS_SHADE_CONFIG`) first, then command line additions on top.
pub fn resolve_config(cli: &Cli) -> Result<ShadeConfig> {
    let mut config = match resolve_config_path(cli) {
        Some(path) => ShadeConfig::load(&path)?,
        None => ShadeConfig::default(),
    };

    config.keep_packages.extend(cli.keep.iter().cloned());
    config.unshaded_packages.extend(cli.unshaded.iter().cloned());
    config.ignore_packages.extend(cli.ignore.iter().cloned());
    if let Some(shadow) = cli.shadow_package.clone() {
        config.shadow_package = shadow;
    }

    tracing::debug!(
        keep = config.keep_packages.len(),
        unshaded = config.unshaded_packages.len(),
        ignore = config.ignore_packages.len(),
        shadow_package = %config.shadow_package,
        "resolved shading config"
    );
    Ok(config)
}
