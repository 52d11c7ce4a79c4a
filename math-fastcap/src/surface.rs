//! Programmatic panel containers
//!
//! A [`Surface`] collects raw triangles and quadrilaterals before they are
//! handed to a [`Problem`](crate::Problem). Panels take the surface name as
//! their conductor name unless a per-panel name is given (geometry files name
//! every panel). Validation of the geometry happens when the surface is added
//! to a problem.

use std::collections::HashMap;

use crate::conductor::validate_name_token;
use crate::error::Result;
use crate::geometry::Vec3;

/// One raw panel of a surface
#[derive(Debug, Clone, PartialEq)]
pub struct SurfacePanel {
    /// Conductor name overriding the surface name
    pub conductor: Option<String>,
    /// 3 or 4 vertices
    pub vertices: Vec<Vec3>,
}

/// A named collection of raw panels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Surface {
    name: Option<String>,
    title: Option<String>,
    panels: Vec<SurfacePanel>,
}

impl Surface {
    /// Create an unnamed, empty surface
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a surface whose panels belong to conductor `name`
    pub fn with_name(name: &str) -> Result<Self> {
        let mut s = Self::new();
        s.set_name(name)?;
        Ok(s)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the conductor name; it must not be empty or contain '%' or ','
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        validate_name_token(name)?;
        self.name = Some(name.to_string());
        Ok(())
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = Some(title.to_string());
    }

    /// Add a quadrilateral panel
    pub fn add_quad(&mut self, p1: Vec3, p2: Vec3, p3: Vec3, p4: Vec3) {
        self.panels.push(SurfacePanel {
            conductor: None,
            vertices: vec![p1, p2, p3, p4],
        });
    }

    /// Add a triangular panel
    pub fn add_tri(&mut self, p1: Vec3, p2: Vec3, p3: Vec3) {
        self.panels.push(SurfacePanel {
            conductor: None,
            vertices: vec![p1, p2, p3],
        });
    }

    /// Add a panel with its own conductor name
    pub fn add_named(&mut self, conductor: &str, vertices: Vec<Vec3>) -> Result<()> {
        validate_name_token(conductor)?;
        self.panels.push(SurfacePanel {
            conductor: Some(conductor.to_string()),
            vertices,
        });
        Ok(())
    }

    /// Apply conductor renames (`from -> to`) to every panel of this surface
    pub fn rename_conductors(&mut self, renames: &HashMap<String, String>) {
        if renames.is_empty() {
            return;
        }
        for panel in &mut self.panels {
            let current = panel.conductor.as_ref().or(self.name.as_ref());
            if let Some(to) = current.and_then(|c| renames.get(c)) {
                panel.conductor = Some(to.clone());
            }
        }
    }

    /// Conductor name of a panel: its own name, else the surface name
    pub fn conductor_of<'a>(&'a self, panel: &'a SurfacePanel) -> Option<&'a str> {
        panel.conductor.as_deref().or(self.name.as_deref())
    }

    pub fn panels(&self) -> &[SurfacePanel] {
        &self.panels
    }

    pub fn panel_count(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }
}
