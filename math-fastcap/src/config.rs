//! Solver configuration
//!
//! [`FastcapConfig`] is a plain serde value. Every `with_*` setter validates
//! its argument immediately; values coming from JSON are validated as a whole
//! on load.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::conductor::validate_selection;
use crate::error::{FastcapError, Result};
use crate::expansion::{MAX_ORDER, auto_order};
use crate::tree::{MAX_DEPTH, TreeOptions};

/// Configuration of one capacitance extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastcapConfig {
    /// Expansion order, 0 selects it from the panel count
    #[serde(default = "default_expansion_order")]
    pub expansion_order: usize,
    /// Tree depth limit, negative selects it from the panel count
    #[serde(default = "default_partitioning_depth")]
    pub partitioning_depth: i32,
    /// Relative residual target of GMRES, in (0, 1)
    #[serde(default = "default_iter_tol")]
    pub iter_tol: f64,
    /// Global permittivity scale applied to the result
    #[serde(default = "default_perm_factor")]
    pub perm_factor: f64,
    /// Conductor key prefixes whose row and column are zeroed
    #[serde(default)]
    pub skip_conductors: Option<Vec<String>>,
    /// Conductor key prefixes whose panels are dropped
    #[serde(default)]
    pub remove_conductors: Option<Vec<String>>,
    /// Cap on GMRES inner iterations per conductor
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// GMRES restart length
    #[serde(default = "default_restart")]
    pub restart: usize,
    /// Panels per leaf before a node is split
    #[serde(default = "default_leaf_capacity")]
    pub leaf_capacity: usize,
    /// Multipole acceptance ratio
    #[serde(default = "default_separation_ratio")]
    pub separation_ratio: f64,
    /// Maximum size of a near-field preconditioner block
    #[serde(default = "default_precond_block_limit")]
    pub precond_block_limit: usize,
    /// Use the block near-field preconditioner
    #[serde(default = "default_precondition")]
    pub precondition: bool,
}

fn default_expansion_order() -> usize {
    2
}

fn default_partitioning_depth() -> i32 {
    -1
}

fn default_iter_tol() -> f64 {
    0.01
}

fn default_perm_factor() -> f64 {
    1.0
}

fn default_max_iterations() -> usize {
    400
}

fn default_restart() -> usize {
    80
}

fn default_leaf_capacity() -> usize {
    16
}

fn default_separation_ratio() -> f64 {
    2.0
}

fn default_precond_block_limit() -> usize {
    128
}

fn default_precondition() -> bool {
    true
}

impl Default for FastcapConfig {
    fn default() -> Self {
        Self {
            expansion_order: default_expansion_order(),
            partitioning_depth: default_partitioning_depth(),
            iter_tol: default_iter_tol(),
            perm_factor: default_perm_factor(),
            skip_conductors: None,
            remove_conductors: None,
            max_iterations: default_max_iterations(),
            restart: default_restart(),
            leaf_capacity: default_leaf_capacity(),
            separation_ratio: default_separation_ratio(),
            precond_block_limit: default_precond_block_limit(),
            precondition: default_precondition(),
        }
    }
}

fn check_order(order: usize) -> Result<()> {
    if order > MAX_ORDER {
        return Err(FastcapError::config(format!(
            "expansion order {} exceeds the maximum of {}",
            order, MAX_ORDER
        )));
    }
    Ok(())
}

fn check_iter_tol(tol: f64) -> Result<()> {
    if !(tol > 0.0 && tol < 1.0) {
        return Err(FastcapError::config(format!(
            "iteration tolerance must be in (0, 1), got {}",
            tol
        )));
    }
    Ok(())
}

fn check_perm_factor(factor: f64) -> Result<()> {
    if !(factor > 0.0) || !factor.is_finite() {
        return Err(FastcapError::config(format!(
            "permittivity factor must be positive, got {}",
            factor
        )));
    }
    Ok(())
}

fn check_positive(what: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(FastcapError::config(format!("{} must be at least 1", what)));
    }
    Ok(())
}

fn check_separation(ratio: f64) -> Result<()> {
    if !(ratio >= 1.0) || !ratio.is_finite() {
        return Err(FastcapError::config(format!(
            "separation ratio must be at least 1, got {}",
            ratio
        )));
    }
    Ok(())
}

impl FastcapConfig {
    /// Check every field
    pub fn validate(&self) -> Result<()> {
        check_order(self.expansion_order)?;
        check_iter_tol(self.iter_tol)?;
        check_perm_factor(self.perm_factor)?;
        validate_selection(&self.skip_conductors)?;
        validate_selection(&self.remove_conductors)?;
        check_positive("maximum iterations", self.max_iterations)?;
        check_positive("restart length", self.restart)?;
        check_positive("leaf capacity", self.leaf_capacity)?;
        check_positive("preconditioner block limit", self.precond_block_limit)?;
        check_separation(self.separation_ratio)
    }

    pub fn with_expansion_order(mut self, order: usize) -> Result<Self> {
        check_order(order)?;
        self.expansion_order = order;
        Ok(self)
    }

    /// Depths beyond [`MAX_DEPTH`] are accepted and clamped when the tree is built
    pub fn with_partitioning_depth(mut self, depth: i32) -> Self {
        self.partitioning_depth = depth;
        self
    }

    pub fn with_iter_tol(mut self, tol: f64) -> Result<Self> {
        check_iter_tol(tol)?;
        self.iter_tol = tol;
        Ok(self)
    }

    pub fn with_perm_factor(mut self, factor: f64) -> Result<Self> {
        check_perm_factor(factor)?;
        self.perm_factor = factor;
        Ok(self)
    }

    /// Conductors to skip, by key prefix; `None` clears the selection
    pub fn with_skip_conductors(mut self, names: Option<Vec<String>>) -> Result<Self> {
        validate_selection(&names)?;
        self.skip_conductors = names;
        Ok(self)
    }

    /// Conductors to remove, by key prefix; `None` clears the selection
    pub fn with_remove_conductors(mut self, names: Option<Vec<String>>) -> Result<Self> {
        validate_selection(&names)?;
        self.remove_conductors = names;
        Ok(self)
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Result<Self> {
        check_positive("maximum iterations", max_iterations)?;
        self.max_iterations = max_iterations;
        Ok(self)
    }

    pub fn with_restart(mut self, restart: usize) -> Result<Self> {
        check_positive("restart length", restart)?;
        self.restart = restart;
        Ok(self)
    }

    pub fn with_leaf_capacity(mut self, capacity: usize) -> Result<Self> {
        check_positive("leaf capacity", capacity)?;
        self.leaf_capacity = capacity;
        Ok(self)
    }

    pub fn with_separation_ratio(mut self, ratio: f64) -> Result<Self> {
        check_separation(ratio)?;
        self.separation_ratio = ratio;
        Ok(self)
    }

    pub fn with_precond_block_limit(mut self, limit: usize) -> Result<Self> {
        check_positive("preconditioner block limit", limit)?;
        self.precond_block_limit = limit;
        Ok(self)
    }

    pub fn with_precondition(mut self, enabled: bool) -> Self {
        self.precondition = enabled;
        self
    }

    /// Expansion order for a problem with `num_panels` panels
    pub fn effective_order(&self, num_panels: usize) -> usize {
        if self.expansion_order == 0 {
            auto_order(num_panels)
        } else {
            self.expansion_order
        }
    }

    /// Tree construction options derived from this configuration
    pub fn tree_options(&self) -> TreeOptions {
        if self.partitioning_depth > MAX_DEPTH as i32 {
            log::warn!(
                "partitioning depth {} clamped to {}",
                self.partitioning_depth,
                MAX_DEPTH
            );
        }
        TreeOptions {
            leaf_capacity: self.leaf_capacity,
            max_depth: usize::try_from(self.partitioning_depth).ok(),
            separation_ratio: self.separation_ratio,
        }
    }

    /// Whether a change from `other` to `self` requires rebuilding the operator
    pub(crate) fn structure_differs(&self, other: &Self) -> bool {
        self.expansion_order != other.expansion_order
            || self.partitioning_depth != other.partitioning_depth
            || self.remove_conductors != other.remove_conductors
            || self.leaf_capacity != other.leaf_capacity
            || self.separation_ratio != other.separation_ratio
            || self.precond_block_limit != other.precond_block_limit
            || self.precondition != other.precondition
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: FastcapConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save the configuration as JSON
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}
