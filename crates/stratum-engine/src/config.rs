//! Engine configuration, loaded from `[engine]`-style TOML.

use std::path::Path;

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

fn default_depth() -> usize {
    64
}

fn default_true() -> bool {
    true
}

fn default_component_methods() -> Vec<String> {
    ["preInit", "init", "start", "stop"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_stub_suffix() -> String {
    "Stub".to_string()
}

fn default_stub_dir() -> String {
    "stubs".to_string()
}

/// Options for a `TypeSystem` session
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct EngineOptions {
    /// Depth guard for modify chains, base chains and nested updates
    #[serde(default = "default_depth")]
    pub max_chain_depth: usize,

    /// Depth guard for version propagation through sub-types
    #[serde(default = "default_depth")]
    pub max_propagation_depth: usize,

    /// Default for `update_type(.., apply_to_live_instances)` callers
    #[serde(default = "default_true")]
    pub apply_to_live_instances: bool,

    /// Lifecycle methods synthesized on demand for auto-components
    #[serde(default = "default_component_methods")]
    pub component_methods: Vec<String>,

    /// Suffix appended to generated stub names
    #[serde(default = "default_stub_suffix")]
    pub stub_suffix: String,

    /// Directory (inside each layer) holding generated stubs
    #[serde(default = "default_stub_dir")]
    pub stub_dir: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_chain_depth: default_depth(),
            max_propagation_depth: default_depth(),
            apply_to_live_instances: true,
            component_methods: default_component_methods(),
            stub_suffix: default_stub_suffix(),
            stub_dir: default_stub_dir(),
        }
    }
}

impl EngineOptions {
    /// Parse options from TOML text
    pub fn from_toml_str(content: &str) -> EngineResult<Self> {
        let options: EngineOptions =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject settings that would disable the depth guards
    pub fn validate(&self) -> EngineResult<()> {
        if self.max_chain_depth == 0 {
            return Err(EngineError::Config("max-chain-depth must be at least 1".into()));
        }
        if self.max_propagation_depth == 0 {
            return Err(EngineError::Config(
                "max-propagation-depth must be at least 1".into(),
            ));
        }
        if self.stub_suffix.is_empty() {
            return Err(EngineError::Config("stub-suffix must not be empty".into()));
        }
        Ok(())
    }

    /// Check if `name` is a synthesized lifecycle method
    pub fn is_component_method(&self, name: &str) -> bool {
        self.component_methods.iter().any(|m| m == name)
    }
}
