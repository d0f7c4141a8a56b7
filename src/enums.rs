use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Kernel used when sampling a volume at non-integer positions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Linear,
    #[default]
    Cubic,
}

/// Key used to order the slices of a series along the scan axis.
///
/// Slices are always ordered ascending by the chosen key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

/// Voxel spacing requested after reslicing.
///
/// Serialized as `auto`, `none` or `x,y,z`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SpacingPolicy {
    /// Isotropic spacing equal to the smallest resliced axis spacing
    Auto,
    /// Keep the spacing produced by the reslice
    #[default]
    None,
    /// Per-axis (x, y, z) spacing in millimetres
    Explicit([f64; 3]),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SpacingPolicyError {
    #[error("expected `auto`, `none` or three comma separated values, got {0:?}")]
    Malformed(String),

    #[error("spacing values must be positive, got {0:?}")]
    NonPositive([f64; 3]),
}

impl SpacingPolicy {
    /// Build an explicit policy, rejecting non-positive components
    pub fn explicit(spacing: [f64; 3]) -> Result<Self, SpacingPolicyError> {
        if spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            Ok(SpacingPolicy::Explicit(spacing))
        } else {
            Err(SpacingPolicyError::NonPositive(spacing))
        }
    }
}

impl FromStr for SpacingPolicy {
    type Err = SpacingPolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SpacingPolicy::Auto),
            "none" => Ok(SpacingPolicy::None),
            other => {
                let values: Vec<f64> = other
                    .split(',')
                    .map(|v| v.trim().parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| SpacingPolicyError::Malformed(s.to_string()))?;
                let spacing: [f64; 3] = values
                    .try_into()
                    .map_err(|_| SpacingPolicyError::Malformed(s.to_string()))?;
                SpacingPolicy::explicit(spacing)
            }
        }
    }
}

impl TryFrom<String> for SpacingPolicy {
    type Error = SpacingPolicyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SpacingPolicy> for String {
    fn from(policy: SpacingPolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for SpacingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpacingPolicy::Auto => write!(f, "auto"),
            SpacingPolicy::None => write!(f, "none"),
            SpacingPolicy::Explicit([x, y, z]) => write!(f, "{x},{y},{z}"),
        }
    }
}
