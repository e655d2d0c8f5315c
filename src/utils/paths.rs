use std::fs;
use std::path::{Path, PathBuf};

/// Directory layout of a packaged model bundle
///
/// ```text
/// <bundle>/information.json
/// <bundle>/app/
/// <bundle>/model/framework/run.sh
/// <bundle>/model/framework/examples/{input,output}.csv
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    bundle_dir: PathBuf,
}

impl BundleLayout {
    pub fn new(bundle_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundle_dir: bundle_dir.into(),
        }
    }

    pub fn app_root(&self) -> PathBuf {
        self.bundle_dir.join("app")
    }

    pub fn model_root(&self) -> PathBuf {
        self.bundle_dir.join("model")
    }

    pub fn framework_dir(&self) -> PathBuf {
        self.model_root().join("framework")
    }

    pub fn run_script(&self) -> PathBuf {
        self.framework_dir().join("run.sh")
    }

    pub fn information_json_path(&self) -> PathBuf {
        self.bundle_dir.join("information.json")
    }

    pub fn settings_json_path(&self) -> PathBuf {
        self.bundle_dir.join("serving.json")
    }

    pub fn example_input_path(&self) -> PathBuf {
        self.framework_dir().join("examples").join("input.csv")
    }

    pub fn example_output_path(&self) -> PathBuf {
        self.framework_dir().join("examples").join("output.csv")
    }
}

/// Root for per-process scratch directories, `~/eos/temp` when a home exists
pub fn get_scratch_root() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("eos").join("temp"))
        .unwrap_or_else(std::env::temp_dir)
}

/// Recursive on-disk size of a directory.
/// Symlinks are not followed and unreadable entries count as zero.
pub fn get_dir_size(path: &Path) -> u64 {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };

    let mut total = 0;
    for entry in entries.flatten() {
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(_) => continue,
        };

        if file_type.is_file() {
            total += entry.metadata().map(|m| m.len()).unwrap_or(0);
        } else if file_type.is_dir() {
            total += get_dir_size(&entry.path());
        }
    }
    total
}
