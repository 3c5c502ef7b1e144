use crate::asm::TokenClass;
use crate::{muted_error, weak_error};
use serde::Deserialize;
use serde_json::Value;
use std::fs::read_to_string;
use std::path::Path;
use strum_macros::Display;

/// Name of the client configuration section.
pub const SECTION: &str = "tabasm";

/// How chatty the server is towards the client log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TraceLevel {
    #[default]
    Off,
    Messages,
    Verbose,
}

/// Editor tooling preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Token classes (`mnemonic`, `directive`, ...) expected in uppercase.
    pub prefer_uppercase: Vec<String>,
    pub trace: TraceLevel,
}

impl Settings {
    const DEFAULT_PATH: &'static str = ".config/tabasm/settings.toml";

    /// Load settings from file, `~/.config/tabasm/settings.toml` if no path
    /// is given. Return [`None`] on errors.
    pub fn from_file(path: Option<&Path>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => weak_error!(read_to_string(path), "settings file:")?,
        };
        weak_error!(toml::de::from_str(&data), "invalid settings:")
    }

    pub fn load() -> Self {
        Self::from_file(None).unwrap_or_default()
    }

    pub fn prefers_uppercase(&self, class: TokenClass) -> bool {
        let name: &'static str = class.into();
        self.prefer_uppercase
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Apply a `workspace/didChangeConfiguration` payload. Keys missing in
    /// the payload keep their current value.
    pub fn apply_client(&mut self, payload: &Value) {
        let section = payload.get(SECTION).unwrap_or(payload);

        if let Some(classes) = section.get("preferUppercase") {
            if let Some(classes) = weak_error!(
                serde_json::from_value::<Vec<String>>(classes.clone()),
                "preferUppercase:"
            ) {
                self.prefer_uppercase = classes;
            }
        }
        if let Some(level) = section.pointer("/trace/server") {
            if let Some(level) = weak_error!(serde_json::from_value(level.clone()), "trace.server:") {
                self.trace = level;
            }
        }
    }
}
