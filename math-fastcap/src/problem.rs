//! Capacitance extraction problem
//!
//! A [`Problem`] collects conductor and dielectric surfaces, builds the
//! multipole operator and its preconditioner on first solve, and runs one
//! GMRES solve per active conductor:
//!
//! ```text
//! Idle -> HierarchyBuilt -> PerConductorSolve(i) -> ColumnFilled(i) -> ... -> Done
//! ```
//!
//! Column `i` of the capacitance matrix holds the charge induced on every
//! conductor when conductor `i` is held at unit potential and all others at
//! zero. Adding panels, or changing an option that affects the operator,
//! drops the cached operator; any configuration change drops the last result.

use std::f64::consts::PI;
use std::fmt::Write as _;
use std::path::Path;

use ndarray::{Array1, Array2};
use solvers::{GmresConfig, gmres, gmres_preconditioned};

use crate::conductor::{ConductorState, ConductorTable, composite_key, validate_name_token};
use crate::config::FastcapConfig;
use crate::error::{FastcapError, Result};
use crate::geometry::{Vec3, add};
use crate::io::{read_geo, read_list};
use crate::operator::FastcapOperator;
use crate::panel::{MAX_ASPECT_RATIO, Orientation, Panel, PanelKind};
use crate::preconditioner::BlockPreconditioner;
use crate::surface::Surface;

/// Vacuum permittivity in F/m
pub const EPSILON0: f64 = 8.854_187_812_8e-12;

/// Iterations between GMRES progress lines at debug level
const GMRES_LOG_INTERVAL: usize = 10;

/// Electrical role of a loaded surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceKind {
    /// Conductor panels embedded in a medium of relative permittivity `outer_perm`
    Conductor { outer_perm: f64 },
    /// Interface between an outer and an inner dielectric.
    ///
    /// Without a reference point the panel winding defines the outward normal.
    /// With one, normals point toward it, or away from it when
    /// `reference_inside` is set.
    Dielectric {
        outer_perm: f64,
        inner_perm: f64,
        reference: Option<Vec3>,
        reference_inside: bool,
    },
}

/// How a surface is placed into a problem
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Group name; `None` allocates `GROUP<n>`
    pub group: Option<String>,
    /// Translation applied to every vertex and to the reference point
    pub displacement: Vec3,
    /// Reuse the group of the previous load so equal names merge across surfaces
    pub link: bool,
    pub kind: SurfaceKind,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            group: None,
            displacement: [0.0; 3],
            link: false,
            kind: SurfaceKind::Conductor { outer_perm: 1.0 },
        }
    }
}

impl LoadOptions {
    /// Conductor surface in a medium of relative permittivity `outer_perm`
    pub fn conductor(outer_perm: f64) -> Self {
        Self {
            kind: SurfaceKind::Conductor { outer_perm },
            ..Self::default()
        }
    }

    /// Dielectric interface oriented by panel winding
    pub fn dielectric(outer_perm: f64, inner_perm: f64) -> Self {
        Self {
            kind: SurfaceKind::Dielectric {
                outer_perm,
                inner_perm,
                reference: None,
                reference_inside: false,
            },
            ..Self::default()
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn with_displacement(mut self, displacement: Vec3) -> Self {
        self.displacement = displacement;
        self
    }

    pub fn linked(mut self) -> Self {
        self.link = true;
        self
    }

    /// Orient a dielectric interface by a reference point; no effect on conductors
    pub fn with_reference(mut self, point: Vec3, inside: bool) -> Self {
        if let SurfaceKind::Dielectric {
            reference,
            reference_inside,
            ..
        } = &mut self.kind
        {
            *reference = Some(point);
            *reference_inside = inside;
        }
        self
    }
}

/// Solver outcome for one excited conductor
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnReport {
    pub conductor: String,
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
}

/// Capacitance matrix of the listed conductors
#[derive(Debug, Clone, PartialEq)]
pub struct CapacitanceResult {
    conductors: Vec<String>,
    matrix: Array2<f64>,
    reports: Vec<ColumnReport>,
    panel_count: usize,
    expansion_order: usize,
    tree_depth: usize,
}

impl CapacitanceResult {
    /// Conductor keys in matrix order
    pub fn conductors(&self) -> &[String] {
        &self.conductors
    }

    /// Matrix in farads; row `j`, column `i` is the charge on `j` for unit potential on `i`
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.matrix.get((row, col)).copied()
    }

    /// Nested rows, convenient for serialization
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.matrix.rows().into_iter().map(|r| r.to_vec()).collect()
    }

    /// One report per solved column, skipped conductors excluded
    pub fn reports(&self) -> &[ColumnReport] {
        &self.reports
    }

    pub fn is_converged(&self) -> bool {
        self.reports.iter().all(|r| r.converged)
    }

    /// Fail with the first column that did not reach the tolerance
    pub fn ensure_converged(&self) -> Result<()> {
        match self.reports.iter().find(|r| !r.converged) {
            Some(r) => Err(FastcapError::SolverNonConvergence {
                conductor: r.conductor.clone(),
                iterations: r.iterations,
                residual: r.residual,
            }),
            None => Ok(()),
        }
    }

    /// Panels that took part in the solve
    pub fn panel_count(&self) -> usize {
        self.panel_count
    }

    pub fn expansion_order(&self) -> usize {
        self.expansion_order
    }

    pub fn tree_depth(&self) -> usize {
        self.tree_depth
    }

    /// Human readable matrix with an SI prefix chosen from the largest entry
    pub fn to_table(&self) -> String {
        let largest = self.matrix.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
        let (unit, name) = si_unit(largest);
        let width = self.conductors.iter().map(|c| c.len()).max().unwrap_or(0).max(4);

        let mut out = String::new();
        let _ = writeln!(out, "CAPACITANCE MATRIX, {}", name);
        let _ = write!(out, "{:width$}", "", width = width + 4);
        for i in 0..self.conductors.len() {
            let _ = write!(out, "{:>12}", i + 1);
        }
        let _ = writeln!(out);
        for (j, key) in self.conductors.iter().enumerate() {
            let _ = write!(out, "{:<width$}{:>4}", key, j + 1, width = width);
            for i in 0..self.conductors.len() {
                let _ = write!(out, "{:>12.4}", self.matrix[[j, i]] / unit);
            }
            let _ = writeln!(out);
        }
        out
    }
}

fn si_unit(value: f64) -> (f64, &'static str) {
    const UNITS: [(f64, &str); 6] = [
        (1.0, "farads"),
        (1e-3, "millifarads"),
        (1e-6, "microfarads"),
        (1e-9, "nanofarads"),
        (1e-12, "picofarads"),
        (1e-15, "femtofarads"),
    ];
    UNITS
        .iter()
        .find(|(u, _)| value >= *u)
        .copied()
        .unwrap_or(UNITS[UNITS.len() - 1])
}

/// Operator, preconditioner and panel bookkeeping for the current geometry
#[derive(Debug)]
struct System {
    operator: FastcapOperator,
    preconditioner: Option<BlockPreconditioner>,
    /// Operator row of every problem panel, `None` for removed panels
    rows: Vec<Option<usize>>,
}

/// A capacitance extraction problem
#[derive(Debug, Default)]
pub struct Problem {
    title: Option<String>,
    config: FastcapConfig,
    panels: Vec<Panel>,
    conductors: ConductorTable,
    group_count: usize,
    last_group: Option<String>,
    system: Option<System>,
    result: Option<CapacitanceResult>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = Some(title.to_string());
    }

    pub fn config(&self) -> &FastcapConfig {
        &self.config
    }

    /// Replace the configuration after validating it
    pub fn set_config(&mut self, config: FastcapConfig) -> Result<()> {
        config.validate()?;
        if config == self.config {
            return Ok(());
        }
        if config.structure_differs(&self.config) {
            self.system = None;
        }
        self.result = None;
        self.config = config;
        Ok(())
    }

    pub fn set_expansion_order(&mut self, order: usize) -> Result<()> {
        self.set_config(self.config.clone().with_expansion_order(order)?)
    }

    pub fn set_partitioning_depth(&mut self, depth: i32) -> Result<()> {
        self.set_config(self.config.clone().with_partitioning_depth(depth))
    }

    pub fn set_iter_tol(&mut self, tol: f64) -> Result<()> {
        self.set_config(self.config.clone().with_iter_tol(tol)?)
    }

    pub fn set_perm_factor(&mut self, factor: f64) -> Result<()> {
        self.set_config(self.config.clone().with_perm_factor(factor)?)
    }

    pub fn set_skip_conductors(&mut self, names: Option<Vec<String>>) -> Result<()> {
        self.set_config(self.config.clone().with_skip_conductors(names)?)
    }

    pub fn set_remove_conductors(&mut self, names: Option<Vec<String>>) -> Result<()> {
        self.set_config(self.config.clone().with_remove_conductors(names)?)
    }

    /// Solver settings for one column, logging progress when debug output is on
    fn gmres_config(&self) -> GmresConfig<f64> {
        let print_interval = if log::log_enabled!(log::Level::Debug) {
            GMRES_LOG_INTERVAL
        } else {
            0
        };
        GmresConfig {
            max_iterations: self.config.max_iterations,
            restart: self.config.restart,
            tolerance: self.config.iter_tol,
            print_interval,
        }
    }

    /// Configuration as pretty-printed JSON
    pub fn dump_config(&self) -> Result<String> {
        self.config.to_json_string()
    }

    /// Panels loaded so far, including those a later removal would drop
    pub fn panel_count(&self) -> usize {
        self.panels.len()
    }

    /// Keys of the conductors that appear in the matrix, in insertion order
    pub fn conductors(&self) -> Vec<String> {
        let states = self
            .conductors
            .states(&self.config.skip_conductors, &self.config.remove_conductors);
        self.conductors
            .iter()
            .zip(states)
            .filter(|(_, s)| *s != ConductorState::Removed)
            .map(|(c, _)| c.key.clone())
            .collect()
    }

    fn next_group(&mut self) -> String {
        self.group_count += 1;
        format!("GROUP{}", self.group_count)
    }

    /// Add the panels of `surface`
    ///
    /// Panels are validated before anything is committed, so a failing
    /// surface leaves the problem unchanged.
    pub fn add(&mut self, surface: &Surface, options: &LoadOptions) -> Result<()> {
        if let Some(g) = &options.group {
            validate_name_token(g)?;
        }
        let group_count = self.group_count;
        let (staged, mut table, group) = match self.stage(surface, options) {
            Ok(staged) => staged,
            Err(e) => {
                self.group_count = group_count;
                return Err(e);
            }
        };

        let added = staged.len();
        for panel in staged {
            if let Some(c) = panel.conductor() {
                table.attach(c, self.panels.len());
            }
            self.panels.push(panel);
        }
        if group.is_some() {
            self.last_group = group;
        }
        self.conductors = table;
        self.system = None;
        self.result = None;
        log::info!(
            "added {} panels from '{}' ({} conductors total)",
            added,
            surface.title().or(surface.name()).unwrap_or("surface"),
            self.conductors.len()
        );
        Ok(())
    }

    /// Validate the panels of `surface` against a copy of the conductor table
    fn stage(
        &mut self,
        surface: &Surface,
        options: &LoadOptions,
    ) -> Result<(Vec<Panel>, ConductorTable, Option<String>)> {
        let d = options.displacement;
        let mut table = self.conductors.clone();
        let mut staged = Vec::with_capacity(surface.panel_count());
        let mut group: Option<String> = None;

        for raw in surface.panels() {
            let vertices: Vec<Vec3> = raw.vertices.iter().map(|v| add(*v, d)).collect();
            let panel = match options.kind {
                SurfaceKind::Conductor { outer_perm } => {
                    let name = surface.conductor_of(raw).ok_or_else(|| {
                        FastcapError::geometry("conductor panel without a conductor name")
                    })?;
                    let group = group.get_or_insert_with(|| self.resolve_group(options));
                    let conductor = table.intern(&composite_key(name, group));
                    Panel::new(
                        &vertices,
                        PanelKind::Conductor { conductor },
                        outer_perm,
                        Orientation::Winding,
                    )?
                }
                SurfaceKind::Dielectric {
                    outer_perm,
                    inner_perm,
                    reference,
                    reference_inside,
                } => {
                    let orientation = match reference {
                        Some(point) => Orientation::Reference {
                            point: add(point, d),
                            inside: reference_inside,
                        },
                        None => Orientation::Winding,
                    };
                    Panel::new(
                        &vertices,
                        PanelKind::Dielectric { inner_perm },
                        outer_perm,
                        orientation,
                    )?
                }
            };
            staged.push(panel);
        }
        Ok((staged, table, group))
    }

    fn resolve_group(&mut self, options: &LoadOptions) -> String {
        match (&options.group, &self.last_group) {
            (Some(g), _) => g.clone(),
            (None, Some(last)) if options.link => last.clone(),
            _ => self.next_group(),
        }
    }

    /// Read a geometry file and add its panels
    pub fn load(&mut self, path: impl AsRef<Path>, options: &LoadOptions) -> Result<()> {
        let surface = read_geo(path)?;
        self.add(&surface, options)
    }

    /// Read a list file and load every surface it names
    ///
    /// Relative file names are resolved against the list file's directory.
    /// Either every entry is loaded or the problem is left unchanged.
    pub fn load_list(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let entries = read_list(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));

        let surfaces = entries
            .iter()
            .map(|e| read_geo(base.join(&e.file)))
            .collect::<Result<Vec<_>>>()?;

        let panels = self.panels.len();
        let conductors = self.conductors.clone();
        let groups = (self.group_count, self.last_group.clone());
        for (entry, surface) in entries.iter().zip(&surfaces) {
            if let Err(e) = self.add(surface, &entry.options) {
                self.panels.truncate(panels);
                self.conductors = conductors;
                (self.group_count, self.last_group) = groups;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Result of the most recent solve, converged or not
    pub fn last_result(&self) -> Option<&CapacitanceResult> {
        self.result.as_ref()
    }

    /// Solve and require every column to converge
    ///
    /// On non-convergence the flagged result stays available through
    /// [`Problem::last_result`].
    pub fn solve(&mut self) -> Result<CapacitanceResult> {
        let result = self.solve_allow_partial()?;
        result.ensure_converged()?;
        Ok(result)
    }

    /// Solve and return the result even if some columns did not converge
    pub fn solve_allow_partial(&mut self) -> Result<CapacitanceResult> {
        if let Some(result) = &self.result {
            return Ok(result.clone());
        }
        log::debug!("assembler state: Idle");

        let states = self
            .conductors
            .states(&self.config.skip_conductors, &self.config.remove_conductors);
        self.ensure_system(&states)?;
        let system = self
            .system
            .as_ref()
            .ok_or_else(|| FastcapError::degenerate("operator is unavailable"))?;
        let operator = &system.operator;
        let panels = operator.panels();
        log::debug!(
            "assembler state: HierarchyBuilt ({} panels, depth {})",
            panels.len(),
            operator.tree().depth()
        );

        // matrix position of every listed conductor
        let mut position = vec![None; self.conductors.len()];
        let mut keys = Vec::new();
        for (c, conductor) in self.conductors.iter().enumerate() {
            if states[c] != ConductorState::Removed {
                position[c] = Some(keys.len());
                keys.push(conductor.key.clone());
            }
        }

        let gmres_config = self.gmres_config();
        let scale = 4.0 * PI * EPSILON0 * self.config.perm_factor;
        let mut matrix = Array2::zeros((keys.len(), keys.len()));
        let mut reports = Vec::new();

        for (c, conductor) in self.conductors.iter().enumerate() {
            let Some(col) = position[c] else { continue };
            if states[c] == ConductorState::Skipped {
                continue;
            }
            log::debug!("assembler state: PerConductorSolve({})", conductor.key);

            let mut rhs = Array1::zeros(panels.len());
            for row in conductor.panels.iter().filter_map(|&p| system.rows[p]) {
                rhs[row] = 1.0;
            }
            let outcome = match &system.preconditioner {
                Some(m) => gmres_preconditioned(operator, m, &rhs, &gmres_config),
                None => gmres(operator, &rhs, &gmres_config),
            };
            if !outcome.is_converged() {
                log::warn!(
                    "conductor '{}' did not converge: residual {:.3e} after {} iterations",
                    conductor.key,
                    outcome.residual(),
                    outcome.iterations()
                );
            }

            let q = outcome.solution();
            for (j, other) in self.conductors.iter().enumerate() {
                if states[j] != ConductorState::Active {
                    continue;
                }
                let Some(row) = position[j] else { continue };
                let charge: f64 = other
                    .panels
                    .iter()
                    .filter_map(|&p| system.rows[p])
                    .map(|k| panels[k].outer_perm * q[k])
                    .sum();
                matrix[[row, col]] = scale * charge;
            }

            reports.push(ColumnReport {
                conductor: conductor.key.clone(),
                iterations: outcome.iterations(),
                residual: outcome.residual(),
                converged: outcome.is_converged(),
            });
            log::debug!(
                "assembler state: ColumnFilled({}) after {} iterations",
                conductor.key,
                outcome.iterations()
            );
        }
        log::debug!("assembler state: Done");

        let result = CapacitanceResult {
            conductors: keys,
            matrix,
            reports,
            panel_count: panels.len(),
            expansion_order: operator.expansion_order(),
            tree_depth: operator.tree().depth(),
        };
        self.result = Some(result.clone());
        Ok(result)
    }

    /// Build the operator for the panels that survive removal
    fn ensure_system(&mut self, states: &[ConductorState]) -> Result<()> {
        if self.system.is_none() {
            let mut rows = Vec::with_capacity(self.panels.len());
            let mut panels = Vec::new();
            for p in &self.panels {
                let kept = p
                    .conductor()
                    .is_none_or(|c| states[c] != ConductorState::Removed);
                rows.push(kept.then_some(panels.len()));
                if kept {
                    panels.push(p.clone());
                }
            }
            if panels.is_empty() {
                return Err(FastcapError::geometry("the problem has no panels to solve"));
            }
            if let Some(p) = panels.iter().find(|p| p.aspect_ratio() > MAX_ASPECT_RATIO) {
                return Err(FastcapError::degenerate(format!(
                    "panel at {:?} has aspect ratio {:.3e}",
                    p.centroid,
                    p.aspect_ratio()
                )));
            }

            let order = self.config.effective_order(panels.len());
            let operator = FastcapOperator::new(panels, order, &self.config.tree_options());
            let preconditioner = if self.config.precondition {
                Some(BlockPreconditioner::new(&operator, self.config.precond_block_limit)?)
            } else {
                None
            };
            self.system = Some(System {
                operator,
                preconditioner,
                rows,
            });
        }
        Ok(())
    }
}
