use serde::Deserialize;

/// Engine tunables. The defaults match the host extension's behavior;
/// hosts may override any subset from a TOML fragment.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Store path of the persisted index side file.
    pub index_path: String,
    /// How long a file must stay quiet before its change is indexed.
    pub debounce_ms: u64,
    /// Lines of context kept either side of a link occurrence.
    pub context_radius: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            index_path: "wikilink-index.json".to_string(),
            debounce_ms: 2000,
            context_radius: 1,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
