// JSON document reading

use crate::error::EngineError;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    if !path.exists() {
        return Err(EngineError::Config(format!("File not found: {:?}", path)));
    }

    let file = File::open(path)?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| EngineError::Config(format!("Failed to parse JSON from {:?}: {}", path, e)))
}

pub fn read_json_file_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, EngineError> {
    if path.exists() {
        read_json_file(path)
    } else {
        Ok(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EngineSettings;

    #[test]
    fn test_missing_file_is_config_error() {
        let result: Result<serde_json::Value, _> = read_json_file(Path::new("/no/such/file.json"));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_missing_settings_fall_back_to_default() {
        let settings: EngineSettings = read_json_file_or_default(Path::new("/no/such/serving.json")).unwrap();
        assert_eq!(settings.fail_max, 100);
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("information.json");
        std::fs::write(&path, "{not json").unwrap();

        let result: Result<serde_json::Value, _> = read_json_file(&path);
        assert!(matches!(result, Err(EngineError::Config(msg)) if msg.contains("Failed to parse")));
    }
}
