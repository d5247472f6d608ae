//! Loaders for the opaque configuration sources. Every loader takes a
//! [`ConfigSource`] instead of touching the filesystem directly, so a
//! caller on Android can hand in asset-manager reads and tests can hand
//! in an in-memory map.

use std::collections::HashMap;

use fastbot_core::ActionType;

use crate::error::ConfigError;

/// An opaque byte source keyed by the logical config name (`max.mapping`,
/// `max.config`, ...). Bytes, not paths: this crate never assumes
/// `std::fs` exists.
pub trait ConfigSource {
    fn read_bytes(&self, key: &str) -> Result<Vec<u8>, ConfigError>;

    fn read_to_string(&self, key: &str) -> Result<String, ConfigError> {
        let bytes = self.read_bytes(key)?;
        String::from_utf8(bytes).map_err(|e| ConfigError::Unreadable(e.to_string()))
    }
}

/// In-memory [`ConfigSource`] backed by a map, for tests and for callers
/// that have already collected every config file into memory.
#[derive(Default)]
pub struct MapConfigSource {
    pub files: HashMap<String, Vec<u8>>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(key.to_string(), contents.into());
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn read_bytes(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        self.files
            .get(key)
            .cloned()
            .ok_or_else(|| ConfigError::Unreadable(key.to_string()))
    }
}

/// Resource-id de-obfuscation table: obfuscated id -> canonical `:id/name`.
#[derive(Clone, Debug, Default)]
pub struct MappingTable {
    entries: HashMap<String, String>,
}

impl MappingTable {
    pub fn resolve<'a>(&'a self, resource_id: &'a str) -> &'a str {
        self.entries.get(resource_id).map(String::as_str).unwrap_or(resource_id)
    }
}

/// Parses `max.mapping`: one `<obfuscated> -> <canonical>` pair per line,
/// blank lines and `#` comments ignored.
pub fn load_mapping(source: &dyn ConfigSource) -> Result<MappingTable, ConfigError> {
    let text = source.read_to_string("max.mapping")?;
    let mut entries = HashMap::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (lhs, rhs) = line.split_once("->").ok_or_else(|| ConfigError::MalformedLine {
            line: lineno + 1,
            reason: "missing '->' separator".into(),
        })?;
        entries.insert(lhs.trim().to_string(), rhs.trim().to_string());
    }
    Ok(MappingTable { entries })
}

#[derive(Clone, Copy, Debug)]
pub struct ConfigFlags {
    pub random_pick_from_string_list: bool,
    pub doinputtext_fuzzing: bool,
    pub listen_mode: bool,
}

impl Default for ConfigFlags {
    fn default() -> Self {
        ConfigFlags {
            random_pick_from_string_list: true,
            doinputtext_fuzzing: true,
            listen_mode: false,
        }
    }
}

/// Parses `max.config`: `key=value` pairs, one per line.
pub fn load_config(source: &dyn ConfigSource) -> Result<ConfigFlags, ConfigError> {
    let text = source.read_to_string("max.config")?;
    let mut flags = ConfigFlags::default();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::MalformedLine {
            line: lineno + 1,
            reason: "missing '=' separator".into(),
        })?;
        let value = value.trim().eq_ignore_ascii_case("true");
        match key.trim() {
            "max.randomPickFromStringList" => flags.random_pick_from_string_list = value,
            "max.doinputtextFuzzing" => flags.doinputtext_fuzzing = value,
            "max.listenMode" => flags.listen_mode = value,
            other => tracing::warn!(key = other, "unrecognized max.config key, ignoring"),
        }
    }
    Ok(flags)
}

/// Parses a line-oriented string list (`max.strings`, `max.valid.strings`).
pub fn load_strings(source: &dyn ConfigSource, key: &str) -> Result<Vec<String>, ConfigError> {
    let text = source.read_to_string(key)?;
    Ok(text.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
}

/// Parses `max.fuzzing.strings`: one entry per line, `#` comments allowed.
pub fn load_fuzzing_strings(source: &dyn ConfigSource) -> Result<Vec<String>, ConfigError> {
    let text = source.read_to_string("max.fuzzing.strings")?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct CustomEvent {
    pub activity: String,
    pub prob: f64,
    pub times: u32,
    #[serde(default)]
    pub actions: Vec<CustomAction>,
}

/// One queued gesture. Bounds-bearing actions are ready to enqueue
/// directly; xpath-only ones need their bounds resolved against the
/// current tree before the driver can act on them.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct CustomAction {
    pub act: String,
    #[serde(default)]
    pub xpath: Option<String>,
    #[serde(default)]
    pub bounds: Option<[i32; 4]>,
}

impl CustomAction {
    pub fn action_type(&self) -> Option<ActionType> {
        fastbot_core::action::ALL_ACTION_TYPES.iter().copied().find(|a| a.name() == self.act)
    }
}

pub fn load_xpath_actions(source: &dyn ConfigSource) -> Result<Vec<CustomEvent>, ConfigError> {
    let text = source.read_to_string("max.xpath.actions")?;
    Ok(serde_json::from_str(&text)?)
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct BlackWidgetEntry {
    pub activity: String,
    #[serde(default)]
    pub xpath: Option<String>,
    /// Relative `[l,t,r,b]` in `[0,1.1]`, or already-absolute pixels —
    /// disambiguated at apply time, not at parse time.
    #[serde(default)]
    pub bounds: Option<[f64; 4]>,
}

pub fn load_widget_black(source: &dyn ConfigSource) -> Result<Vec<BlackWidgetEntry>, ConfigError> {
    let text = source.read_to_string("max.widget.black")?;
    Ok(serde_json::from_str(&text)?)
}

/// Sentinel marking a tree-pruning field as "leave unchanged".
pub const INVALID_PROPERTY: &str = "InvalidProperty";

#[derive(Clone, Debug, serde::Deserialize)]
pub struct TreePruningRule {
    pub activity: String,
    pub xpath: String,
    #[serde(default = "default_invalid")]
    pub resourceid: String,
    #[serde(default = "default_invalid")]
    pub text: String,
    #[serde(default = "default_invalid")]
    pub contentdesc: String,
    #[serde(default = "default_invalid")]
    pub classname: String,
}

fn default_invalid() -> String {
    INVALID_PROPERTY.to_string()
}

pub fn load_tree_pruning(source: &dyn ConfigSource) -> Result<Vec<TreePruningRule>, ConfigError> {
    let text = source.read_to_string("max.tree.pruning")?;
    Ok(serde_json::from_str(&text)?)
}
