//! Fulfillment configuration: templated actions and initial context (TOML).

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::registry::Replace;
use crate::markup::is_tag_name;
use crate::templated::check_template;

/// Fulfillment configuration (TOML).
///
/// ```toml
/// max_ticks = 16
///
/// [context]
/// user = "bob"
///
/// [actions.greet]
/// template = "hello {{ context.user }}"
///
/// [actions.shout]
/// template = "{{ content | upper }}"
/// series = true
/// ```
///
/// Missing fields default to an empty registry with no tick limit.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FulfillConfig {
    /// Upper bound on ticks per call; unbounded when absent.
    pub max_ticks: Option<u32>,

    /// Initial context shared by every handler of a call.
    pub context: Map<String, Value>,

    /// Tag name -> templated action.
    pub actions: BTreeMap<String, TemplatedAction>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TemplatedAction {
    /// minijinja source rendered to produce the response.
    pub template: String,
    pub replace: ReplaceMode,
    pub series: bool,
}

/// Serializable subset of [`Replace`]; custom replacers need code.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReplaceMode {
    #[default]
    Node,
    Before,
    After,
    All,
}

impl ReplaceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReplaceMode::Node => "node",
            ReplaceMode::Before => "before",
            ReplaceMode::After => "after",
            ReplaceMode::All => "all",
        }
    }
}

impl From<ReplaceMode> for Replace {
    fn from(mode: ReplaceMode) -> Self {
        match mode {
            ReplaceMode::Node => Replace::Node,
            ReplaceMode::Before => Replace::Before,
            ReplaceMode::After => Replace::After,
            ReplaceMode::All => Replace::All,
        }
    }
}

impl FulfillConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_ticks == Some(0) {
            return Err(anyhow!("max_ticks must be > 0"));
        }
        for (name, action) in &self.actions {
            if !is_tag_name(name) {
                return Err(anyhow!("action name {name:?} is not a valid tag name"));
            }
            check_template(&action.template)
                .with_context(|| format!("actions.{name}.template"))?;
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FulfillConfig::default()`.
pub fn load_config(path: &Path) -> Result<FulfillConfig> {
    if !path.exists() {
        return Ok(FulfillConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FulfillConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
