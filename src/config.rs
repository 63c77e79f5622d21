//! Runtime options for the band-gap pipeline.
//!
//! Every option struct has defaults, a `validate()` check and a JSON entry
//! point, so a driver can keep its whole setup in one config file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PhononicError, PhononicResult};
use crate::types::{
    EigensolverKind, GapMode, DEFAULT_FEPS, DEFAULT_FREQ_MARGINS, DEFAULT_FREQ_STEP,
    DEFAULT_MOMENTUM_THRESHOLD, DEFAULT_ZEPS,
};

fn parse_json<T: for<'de> Deserialize<'de>>(json: &str) -> PhononicResult<T> {
    serde_json::from_str(json).map_err(|e| PhononicError::Config(format!("JSON parse error: {e}")))
}

/// Options of the band-gap detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandGapOptions {
    /// Solver name echoed into the result.
    pub eigensolver: EigensolverKind,
    /// Slice of resonances to scan; a negative end counts from the back.
    pub eig_range: Option<(i64, i64)>,
    /// Explicit frequency window; overrides `eig_range` and the margins.
    pub fixed_eig_range: Option<(f64, f64)>,
    /// Margins prepended/appended to the resonance range, in per cent.
    pub freq_margins: (f64, f64),
    /// Sampling step in per cent of the range with margins.
    pub freq_step: f64,
    pub feps: f64,
    pub zeps: f64,
    pub gap_mode: GapMode,
}

impl Default for BandGapOptions {
    fn default() -> Self {
        Self {
            eigensolver: EigensolverKind::default(),
            eig_range: None,
            fixed_eig_range: None,
            freq_margins: DEFAULT_FREQ_MARGINS,
            freq_step: DEFAULT_FREQ_STEP,
            feps: DEFAULT_FEPS,
            zeps: DEFAULT_ZEPS,
            gap_mode: GapMode::default(),
        }
    }
}

impl BandGapOptions {
    /// Margins as fractions of the resonance range.
    pub fn margin_fractions(&self) -> (f64, f64) {
        (0.01 * self.freq_margins.0, 0.01 * self.freq_margins.1)
    }

    /// Sampling step as a fraction of the range with margins.
    pub fn step_fraction(&self) -> f64 {
        0.01 * self.freq_step
    }

    pub fn validate(&self) -> PhononicResult<()> {
        if !(self.feps > 0.0) {
            return Err(PhononicError::Config(format!(
                "feps must be > 0, got {}",
                self.feps
            )));
        }
        if !(self.zeps > 0.0) {
            return Err(PhononicError::Config(format!(
                "zeps must be > 0, got {}",
                self.zeps
            )));
        }
        if !(self.freq_step > 0.0) {
            return Err(PhononicError::Config(format!(
                "freq_step must be > 0, got {}",
                self.freq_step
            )));
        }
        if self.freq_margins.0 < 0.0 || self.freq_margins.1 < 0.0 {
            return Err(PhononicError::Config(format!(
                "freq_margins must be non-negative, got {:?}",
                self.freq_margins
            )));
        }
        if let Some((lo, hi)) = self.fixed_eig_range {
            if !(lo < hi) {
                return Err(PhononicError::Config(format!(
                    "fixed_eig_range must satisfy min < max, got ({lo}, {hi})"
                )));
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> PhononicResult<Self> {
        let opts: Self = parse_json(json)?;
        opts.validate()?;
        Ok(opts)
    }
}

/// Options of the eigenmomenta computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EigenmomentaOptions {
    /// Variable the eigenvectors are assigned to.
    pub var_name: String,
    /// Name of the linear functional to evaluate.
    pub expression: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// When set, `threshold` is relative to the largest momentum norm.
    #[serde(default = "default_true")]
    pub threshold_is_relative: bool,
}

fn default_threshold() -> f64 {
    DEFAULT_MOMENTUM_THRESHOLD
}

fn default_true() -> bool {
    true
}

impl EigenmomentaOptions {
    pub fn new(var_name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            var_name: var_name.into(),
            expression: expression.into(),
            threshold: DEFAULT_MOMENTUM_THRESHOLD,
            threshold_is_relative: true,
        }
    }

    pub fn with_threshold(mut self, threshold: f64, relative: bool) -> Self {
        self.threshold = threshold;
        self.threshold_is_relative = relative;
        self
    }

    pub fn validate(&self) -> PhononicResult<()> {
        if self.var_name.is_empty() {
            return Err(PhononicError::Config(
                "missing \"var_name\" in eigenmomenta options".to_string(),
            ));
        }
        if !(self.threshold >= 0.0) {
            return Err(PhononicError::Config(format!(
                "threshold must be >= 0, got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> PhononicResult<Self> {
        let opts: Self = parse_json(json)?;
        opts.validate()?;
        Ok(opts)
    }
}

/// Options of the unit-cell eigenproblem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvpOptions {
    pub eigensolver: EigensolverKind,
    /// Stiffness contrast between matrix and inclusion.
    pub elasticity_contrast: f64,
    /// Scale parameter ε of the periodic microstructure.
    pub scale_epsilon: f64,
}

impl Default for EvpOptions {
    fn default() -> Self {
        Self {
            eigensolver: EigensolverKind::default(),
            elasticity_contrast: 1.0,
            scale_epsilon: 1.0,
        }
    }
}

impl EvpOptions {
    pub fn validate(&self) -> PhononicResult<()> {
        if !(self.scale_epsilon > 0.0) {
            return Err(PhononicError::Config(format!(
                "scale_epsilon must be > 0, got {}",
                self.scale_epsilon
            )));
        }
        if !self.elasticity_contrast.is_finite() {
            return Err(PhononicError::Config(format!(
                "elasticity_contrast must be finite, got {}",
                self.elasticity_contrast
            )));
        }
        Ok(())
    }
}

/// Material property tables: material name -> property name -> value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialsConfig {
    materials: BTreeMap<String, BTreeMap<String, f64>>,
}

impl MaterialsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(
        mut self,
        material: impl Into<String>,
        property: impl Into<String>,
        value: f64,
    ) -> Self {
        self.insert(material, property, value);
        self
    }

    pub fn insert(&mut self, material: impl Into<String>, property: impl Into<String>, value: f64) {
        self.materials
            .entry(material.into())
            .or_default()
            .insert(property.into(), value);
    }

    pub fn get(&self, material: &str, property: &str) -> Option<f64> {
        self.materials.get(material)?.get(property).copied()
    }

    pub fn from_json(json: &str) -> PhononicResult<Self> {
        parse_json(json)
    }
}
