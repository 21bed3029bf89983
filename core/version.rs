use crate::error::{AppError, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A Visual Studio version tag such as `14.0`. Always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct VsVersion(f64);

impl VsVersion {
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && value > 0.0 {
            Ok(VsVersion(value))
        } else {
            Err(AppError::Config(format!(
                "Invalid Visual Studio version '{}'",
                value
            )))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl fmt::Display for VsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.0)
    }
}

impl FromStr for VsVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim().parse::<f64>().map_err(|e| {
            AppError::Config(format!("Invalid Visual Studio version '{}': {}", s, e))
        })?;
        VsVersion::new(value)
    }
}
