//! Conductor naming, merging and skip/remove selection
//!
//! A conductor is identified by the composite key `name%group`. Panels loaded
//! with an identical key become one electrically connected conductor; the
//! merge happens when the panels are added and cannot be undone.

use std::collections::HashMap;

use crate::error::{FastcapError, Result};

/// Separator between conductor name and group name
pub const GROUP_SEPARATOR: char = '%';

/// Check a conductor-name token (a name, a group or a selection prefix)
pub fn validate_name_token(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FastcapError::config(
            "A conductor name must not be an empty string",
        ));
    }
    if name.contains(GROUP_SEPARATOR) || name.contains(',') {
        return Err(FastcapError::config(format!(
            "'%' or ',' characters are not allowed in this conductor name: '{}'",
            name
        )));
    }
    Ok(())
}

/// Validate every entry of a skip/remove selection
pub fn validate_selection(selection: &Option<Vec<String>>) -> Result<()> {
    if let Some(names) = selection {
        for name in names {
            validate_name_token(name)?;
        }
    }
    Ok(())
}

/// Build the composite key `name%group`
pub fn composite_key(name: &str, group: &str) -> String {
    format!("{}{}{}", name, GROUP_SEPARATOR, group)
}

/// Whether `key` is selected by any prefix in `selection`
pub fn matches_selection(key: &str, selection: &Option<Vec<String>>) -> bool {
    selection
        .as_ref()
        .is_some_and(|names| names.iter().any(|p| key.starts_with(p.as_str())))
}

/// Lifecycle of a conductor for one solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConductorState {
    /// Excited and reported
    Active,
    /// Panels kept, listed, but its row and column read zero
    Skipped,
    /// Panels dropped from the system and not listed
    Removed,
}

/// A named set of panels held at a common potential
#[derive(Debug, Clone, PartialEq)]
pub struct Conductor {
    /// Composite key `name%group`
    pub key: String,
    /// Indices into the problem's panel list, in insertion order
    pub panels: Vec<usize>,
}

/// Insertion-ordered conductor registry
#[derive(Debug, Clone, Default)]
pub struct ConductorTable {
    conductors: Vec<Conductor>,
    index: HashMap<String, usize>,
}

impl ConductorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index for `key`, creating the conductor on first use
    pub fn intern(&mut self, key: &str) -> usize {
        if let Some(&i) = self.index.get(key) {
            return i;
        }
        let i = self.conductors.len();
        self.conductors.push(Conductor {
            key: key.to_string(),
            panels: Vec::new(),
        });
        self.index.insert(key.to_string(), i);
        i
    }

    /// Record that `panel` belongs to conductor `conductor`
    pub fn attach(&mut self, conductor: usize, panel: usize) {
        self.conductors[conductor].panels.push(panel);
    }

    pub fn len(&self) -> usize {
        self.conductors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conductors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conductor> {
        self.conductors.iter()
    }

    /// Lifecycle state of every conductor under the given selections
    ///
    /// Removal wins over skipping. Selection entries that match no conductor
    /// are reported with a warning.
    pub fn states(
        &self,
        skip: &Option<Vec<String>>,
        remove: &Option<Vec<String>>,
    ) -> Vec<ConductorState> {
        for (what, selection) in [("skip", skip), ("remove", remove)] {
            for prefix in selection.iter().flatten() {
                if !self.conductors.iter().any(|c| c.key.starts_with(prefix.as_str())) {
                    log::warn!("{} selection '{}' matches no conductor", what, prefix);
                }
            }
        }

        self.conductors
            .iter()
            .map(|c| {
                if matches_selection(&c.key, remove) {
                    ConductorState::Removed
                } else if matches_selection(&c.key, skip) {
                    ConductorState::Skipped
                } else {
                    ConductorState::Active
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_validation_messages() {
        assert_eq!(
            validate_name_token("").unwrap_err().to_string(),
            "configuration error: A conductor name must not be an empty string"
        );
        assert_eq!(
            validate_name_token("a,b").unwrap_err().to_string(),
            "configuration error: '%' or ',' characters are not allowed in this conductor name: 'a,b'"
        );
        assert!(validate_name_token("a%b").unwrap_err().is_config_error());
        assert!(validate_name_token("C1").is_ok());
        assert!(validate_selection(&Some(vec!["C1".into(), "".into()])).is_err());
        assert!(validate_selection(&None).is_ok());
        assert!(validate_selection(&Some(vec![])).is_ok());
    }

    #[test]
    fn test_intern_merges_identical_keys() {
        let mut table = ConductorTable::new();
        let a = table.intern("cb%G");
        let b = table.intern("ct%G");
        let c = table.intern("cb%G");
        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        table.attach(a, 0);
        table.attach(c, 5);
        let merged = table.iter().next().unwrap();
        assert_eq!(merged.panels, vec![0, 5]);
        let keys: Vec<&str> = table.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["cb%G", "ct%G"]);
    }

    #[test]
    fn test_prefix_selection() {
        let sel = Some(vec!["ct".to_string()]);
        assert!(matches_selection("ct1%GROUP1", &sel));
        assert!(matches_selection("ct2%GROUP2", &sel));
        assert!(!matches_selection("cb%GROUP3", &sel));
        assert!(!matches_selection("ct1%GROUP1", &None));
        assert!(!matches_selection("ct1%GROUP1", &Some(vec![])));
    }

    #[test]
    fn test_states_remove_wins() {
        let mut table = ConductorTable::new();
        table.intern(&composite_key("a", "G1"));
        table.intern(&composite_key("b", "G1"));
        table.intern(&composite_key("c", "G1"));

        let states = table.states(
            &Some(vec!["a".into(), "b".into()]),
            &Some(vec!["b".into(), "zzz".into()]),
        );
        assert_eq!(
            states,
            vec![
                ConductorState::Skipped,
                ConductorState::Removed,
                ConductorState::Active
            ]
        );
    }
}
