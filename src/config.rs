use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

use crate::{
    enums::{Interpolation, SortBy, SpacingPolicy},
    reconstruction::ReconstructionOptions,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("parsing config {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Output footprint (width, height)
    pub out_size: (usize, usize),
    /// Fill value for voxels introduced by padding, reslicing and cropping
    pub background: f32,
    pub spacing: SpacingPolicy,
    pub interpolation: Interpolation,
    /// Fewer slices than this after reconstruction is treated as a failure
    pub min_depth: usize,
    pub sort_by: SortBy,
    /// Worker threads, defaults to the available parallelism
    pub workers: Option<usize>,
    /// Write a PNG of the centre output slice next to the metadata
    pub preview: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            out_size: (400, 400),
            background: -2000.0,
            spacing: SpacingPolicy::None,
            interpolation: Interpolation::Cubic,
            min_depth: 5,
            sort_by: SortBy::ImagePositionPatient,
            workers: None,
            preview: false,
        }
    }
}

impl ProcessingConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Yaml {
            path: path_ref.display().to_string(),
            source,
        })
    }

    pub fn reconstruction_options(&self) -> ReconstructionOptions {
        ReconstructionOptions {
            spacing: self.spacing,
            interpolation: self.interpolation,
            background: self.background,
            min_depth: self.min_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_reconstruction_defaults() {
        let cfg = ProcessingConfig::default();
        assert_eq!(cfg.reconstruction_options(), ReconstructionOptions::default());
        assert_eq!(cfg.out_size, (400, 400));
    }

    #[test]
    fn config_load_reads_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        let yaml = "out_size: [256, 320]\n\
                    spacing: auto\n\
                    interpolation: linear\n\
                    sort_by: instance_number\n";
        temp.write_all(yaml.as_bytes()).unwrap();
        let path = temp.into_temp_path();
        let cfg = ProcessingConfig::load(&path).unwrap();

        assert_eq!(cfg.out_size, (256, 320));
        assert_eq!(cfg.spacing, SpacingPolicy::Auto);
        assert_eq!(cfg.interpolation, Interpolation::Linear);
        assert_eq!(cfg.sort_by, SortBy::InstanceNumber);
        assert_eq!(cfg.background, -2000.0);
    }

    #[test]
    fn explicit_spacing_from_yaml() {
        let cfg: ProcessingConfig = serde_yaml::from_str("spacing: \"0.5, 0.5, 1.0\"\n").unwrap();
        assert_eq!(cfg.spacing, SpacingPolicy::Explicit([0.5, 0.5, 1.0]));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ProcessingConfig::load("/nonexistent/reslice.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/reslice.yaml"));
    }
}
