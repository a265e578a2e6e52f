//! CLI commands

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use keel_eks::OrchestratorConfig;

use crate::{Error, Result};

pub mod node_pool_version;
pub mod plan;
pub mod select_addon;
pub mod validate_encryption;
pub mod validate_network;

/// Load the orchestrator configuration, or the defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            Ok(OrchestratorConfig::from_file(path)?)
        }
        None => Ok(OrchestratorConfig::default()),
    }
}

/// Read a YAML (or JSON) input document
pub fn read_input<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Input {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_config_path_uses_defaults() {
        let config = load_config(None).unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn invalid_config_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "pollIntervalSecs: 0").unwrap();
        let err = load_config(Some(file.path())).unwrap_err();
        assert!(matches!(err, Error::Keel(_)));
    }

    #[test]
    fn unreadable_input_names_the_path() {
        let err = read_input::<Vec<String>>(Path::new("/nonexistent/keel-input.yaml"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/keel-input.yaml"));
    }
}
