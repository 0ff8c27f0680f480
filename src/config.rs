use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ImporterConfig {
    /// Node whose `instance_list` holds the scene's instances.
    pub instance_group: String,
    pub shader_search_paths: Vec<PathBuf>,
    /// Threads for the mesh build. Zero lets the pool decide.
    pub worker_threads: usize,
    /// Whether instances with a negative determinant get their own, inverted index list.
    pub invert_winding_for_negative_scale: bool,
    /// Searched for shader fragments whose configured path cannot be read.
    pub fragment_fallback_dir: Option<PathBuf>,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            instance_group: "mtoer_instgroup_00".to_string(),
            shader_search_paths: Vec::new(),
            worker_threads: 0,
            invert_winding_for_negative_scale: true,
            fragment_fallback_dir: None,
        }
    }
}

impl ImporterConfig {
    pub fn from_json(value: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(value)?)
    }
}

pub struct ConfigFileLoader {
    pub path: PathBuf,
    config: Option<ImporterConfig>,
}

impl ConfigFileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: None,
        }
    }

    /// Reads the config file, or writes the defaults if there is none yet.
    pub fn load_config(&mut self) -> anyhow::Result<&ImporterConfig> {
        let config = match std::fs::read_to_string(&self.path) {
            Ok(content) => ImporterConfig::from_json(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {:?}, writing the defaults", self.path);
                self.config = Some(ImporterConfig::default());
                self.save_config()?;
                ImporterConfig::default()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(&*self.config.insert(config))
    }

    pub fn get_or_load_config(&mut self) -> anyhow::Result<&ImporterConfig> {
        if self.config.is_none() {
            self.load_config()?;
        }
        self.config
            .as_ref()
            .ok_or_else(|| anyhow::format_err!("Config {:?} was not loaded", self.path))
    }

    pub fn save_config(&self) -> anyhow::Result<()> {
        if let Some(config) = &self.config {
            let content = serde_json::to_string_pretty(config)?;
            std::fs::write(&self.path, content)?;
        }
        Ok(())
    }
}
