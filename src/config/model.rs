// src/config/model.rs

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [nomad]
/// address = "http://127.0.0.1:4646"
/// token = "..."
///
/// [stream]
/// max_consecutive_errors = 5
/// ```
///
/// Every section is optional. Values from the environment (`NOMAD_ADDR`,
/// `NOMAD_TOKEN`, `NOMAD_NAMESPACE`, `NOMAD_REGION`) override the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub nomad: NomadSection,

    #[serde(default)]
    pub stream: StreamSection,
}

impl RawConfigFile {
    /// Apply environment overrides using the given lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(address) = non_empty("NOMAD_ADDR") {
            self.nomad.address = address;
        }
        if let Some(token) = non_empty("NOMAD_TOKEN") {
            self.nomad.token = Some(token);
        }
        if let Some(namespace) = non_empty("NOMAD_NAMESPACE") {
            self.nomad.namespace = Some(namespace);
        }
        if let Some(region) = non_empty("NOMAD_REGION") {
            self.nomad.region = Some(region);
        }
    }
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub nomad: NomadSection,
    pub stream: StreamSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(nomad: NomadSection, stream: StreamSection) -> Self {
        Self { nomad, stream }
    }
}

/// `[nomad]` section: how to reach the Nomad API.
#[derive(Debug, Clone, Deserialize)]
pub struct NomadSection {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    /// Timeout for non-streaming requests.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_address() -> String {
    "http://127.0.0.1:4646".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for NomadSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            token: None,
            namespace: None,
            region: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// `[stream]` section: event stream behaviour while waiting.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    /// Stream errors tolerated in a row before the wait gives up.
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,

    /// Capacity of the event batch channel.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_buffer() -> usize {
    10
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            max_consecutive_errors: default_max_consecutive_errors(),
            buffer: default_buffer(),
        }
    }
}
