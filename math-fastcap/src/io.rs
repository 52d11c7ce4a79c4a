//! Reader for the line-oriented geometry format
//!
//! ```text
//! 0 title of the structure
//! * comment
//! Q <name> x1 y1 z1 x2 y2 z2 x3 y3 z3 x4 y4 z4
//! T <name> x1 y1 z1 x2 y2 z2 x3 y3 z3
//! N <name> <new name>
//! ```
//!
//! Record letters are case-insensitive. Lines starting with `%`, `*` or `#`
//! are comments and blank lines are ignored. A rename applies to every panel
//! of the file regardless of where the `N` record appears.
//!
//! A list file names several geometry files and how to load them:
//!
//! ```text
//! G <group name>
//! C <file> <outer perm> tx ty tz [+]
//! D <file> <outer perm> <inner perm> tx ty tz rx ry rz [-]
//! ```
//!
//! `+` links the next conductor file into the same group, `-` marks the
//! reference point as inside the dielectric surface. A `G` record names the
//! group of the next conductor file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{FastcapError, Result};
use crate::geometry::Vec3;
use crate::problem::LoadOptions;
use crate::surface::Surface;

fn parse_error(line: usize, message: impl Into<String>) -> FastcapError {
    FastcapError::Parse {
        line,
        message: message.into(),
    }
}

/// Parse `count` coordinates into points
fn parse_points<'a>(
    fields: impl Iterator<Item = &'a str>,
    count: usize,
    line: usize,
    record: &str,
) -> Result<Vec<Vec3>> {
    let values = fields
        .take(count * 3)
        .map(|f| {
            f.parse::<f64>()
                .map_err(|_| parse_error(line, format!("bad {} format: '{}' is not a number", record, f)))
        })
        .collect::<Result<Vec<f64>>>()?;
    if values.len() != count * 3 {
        return Err(parse_error(
            line,
            format!(
                "bad {} format: expected {} coordinates, got {}",
                record,
                count * 3,
                values.len()
            ),
        ));
    }
    Ok(values.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

/// Parse geometry text into a [`Surface`]
///
/// The first line must start with `0`; the rest of it becomes the title.
pub fn parse_geo(text: &str) -> Result<Surface> {
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));
    let mut surface = Surface::new();

    let (_, header) = lines
        .next()
        .ok_or_else(|| parse_error(1, "empty geometry file"))?;
    let title = header
        .strip_prefix('0')
        .ok_or_else(|| parse_error(1, "the first line must start with '0' followed by the title"))?;
    surface.set_title(title.trim());

    let mut renames: HashMap<String, String> = HashMap::new();

    for (lineno, raw) in lines {
        let line = raw.trim();
        let Some(first) = line.chars().next() else {
            continue;
        };
        if matches!(first, '%' | '*' | '#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        // record keyword, only its first letter matters
        fields.next();
        let kind = first.to_ascii_uppercase();
        if !matches!(kind, 'Q' | 'T' | 'N') {
            return Err(parse_error(lineno, format!("bad line format: '{}'", line)));
        }

        let name = fields
            .next()
            .ok_or_else(|| parse_error(lineno, "missing conductor name"))?;

        match kind {
            'Q' => {
                let points = parse_points(fields, 4, lineno, "quad")?;
                surface
                    .add_named(name, points)
                    .map_err(|e| parse_error(lineno, e.to_string()))?;
            }
            'T' => {
                let points = parse_points(fields, 3, lineno, "tri")?;
                surface
                    .add_named(name, points)
                    .map_err(|e| parse_error(lineno, e.to_string()))?;
            }
            _ => {
                let new_name = fields
                    .next()
                    .ok_or_else(|| parse_error(lineno, "bad rename format: missing new name"))?;
                crate::conductor::validate_name_token(new_name)
                    .map_err(|e| parse_error(lineno, e.to_string()))?;
                renames.insert(name.to_string(), new_name.to_string());
            }
        }
    }

    surface.rename_conductors(&renames);
    log::debug!(
        "parsed geometry '{}' with {} panels",
        surface.title().unwrap_or_default(),
        surface.panel_count()
    );
    Ok(surface)
}

/// Read and parse a geometry file
pub fn read_geo(path: impl AsRef<Path>) -> Result<Surface> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_geo(&text)
}

/// One surface named by a list file
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    /// Geometry file, as written in the list
    pub file: PathBuf,
    pub options: LoadOptions,
}

fn parse_numbers(fields: &[&str], line: usize, record: &str) -> Result<Vec<f64>> {
    fields
        .iter()
        .map(|f| {
            f.parse::<f64>()
                .map_err(|_| parse_error(line, format!("bad {} format: '{}' is not a number", record, f)))
        })
        .collect()
}

/// Parse list-file text into load entries
pub fn parse_list(text: &str) -> Result<Vec<ListEntry>> {
    let mut entries = Vec::new();
    let mut pending_group: Option<String> = None;
    let mut chained = false;

    for (i, raw) in text.lines().enumerate() {
        let lineno = i + 1;
        let line = raw.trim();
        let Some(first) = line.chars().next() else {
            continue;
        };
        if matches!(first, '%' | '*' | '#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().skip(1).collect();

        match first.to_ascii_uppercase() {
            'G' => {
                let name = fields
                    .first()
                    .ok_or_else(|| parse_error(lineno, "bad group name format"))?;
                crate::conductor::validate_name_token(name)
                    .map_err(|e| parse_error(lineno, e.to_string()))?;
                pending_group = Some(name.to_string());
            }
            'C' => {
                if fields.len() < 5 || fields.len() > 6 {
                    return Err(parse_error(lineno, "bad conductor surface format"));
                }
                let v = parse_numbers(&fields[1..5], lineno, "conductor surface")?;
                let link_next = match fields.get(5) {
                    Some(&"+") => true,
                    Some(flag) => {
                        return Err(parse_error(lineno, format!("unknown conductor flag '{}'", flag)));
                    }
                    None => false,
                };
                let mut options = LoadOptions::conductor(v[0]).with_displacement([v[1], v[2], v[3]]);
                options.link = chained;
                if !chained {
                    options.group = pending_group.take();
                }
                chained = link_next;
                entries.push(ListEntry {
                    file: PathBuf::from(fields[0]),
                    options,
                });
            }
            'D' => {
                if fields.len() < 9 || fields.len() > 10 {
                    return Err(parse_error(lineno, "bad dielectric interface surface format"));
                }
                let v = parse_numbers(&fields[1..9], lineno, "dielectric interface surface")?;
                let inside = match fields.get(9) {
                    Some(&"-") => true,
                    Some(flag) => {
                        return Err(parse_error(lineno, format!("unknown dielectric flag '{}'", flag)));
                    }
                    None => false,
                };
                let options = LoadOptions::dielectric(v[0], v[1])
                    .with_displacement([v[2], v[3], v[4]])
                    .with_reference([v[5], v[6], v[7]], inside);
                pending_group = None;
                chained = false;
                entries.push(ListEntry {
                    file: PathBuf::from(fields[0]),
                    options,
                });
            }
            'B' => {
                return Err(parse_error(
                    lineno,
                    "thin conductors on dielectric interfaces are not supported",
                ));
            }
            _ => return Err(parse_error(lineno, format!("bad line format: '{}'", line))),
        }
    }
    Ok(entries)
}

/// Read and parse a list file
pub fn read_list(path: impl AsRef<Path>) -> Result<Vec<ListEntry>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_list(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::SurfaceKind;

    const PLATES: &str = "0 two plates
* bottom
Q bot 0 0 0  1 0 0  1 1 0  0 1 0
q bot 1 0 0  2 0 0  2 1 0  1 1 0

# top
T top 0 0 1  1 0 1  0 1 1
N bot ground
";

    #[test]
    fn test_parse_records() {
        let s = parse_geo(PLATES).unwrap();
        assert_eq!(s.title(), Some("two plates"));
        assert_eq!(s.panel_count(), 3);
        assert_eq!(s.panels()[2].vertices.len(), 3);
        assert_eq!(s.panels()[1].vertices[1], [2.0, 0.0, 0.0]);
        assert_eq!(s.conductor_of(&s.panels()[0]), Some("ground"));
        assert_eq!(s.conductor_of(&s.panels()[1]), Some("ground"));
        assert_eq!(s.conductor_of(&s.panels()[2]), Some("top"));
    }

    #[test]
    fn test_missing_title_line() {
        let err = parse_geo("Q a 0 0 0 1 0 0 1 1 0 0 1 0\n").unwrap_err();
        assert!(matches!(err, FastcapError::Parse { line: 1, .. }));
        assert!(parse_geo("").is_err());
    }

    #[test]
    fn test_bad_records_report_line() {
        let err = parse_geo("0 t\nQ a 0 0 0 1 0 0 1 1 0\n").unwrap_err();
        assert!(matches!(err, FastcapError::Parse { line: 2, .. }));
        assert!(err.to_string().contains("expected 12 coordinates"));

        let err = parse_geo("0 t\n* ok\nT a 0 0 0 1 x 0 0 1 0\n").unwrap_err();
        assert!(matches!(err, FastcapError::Parse { line: 3, .. }));

        let err = parse_geo("0 t\nX a 0 0 0\n").unwrap_err();
        assert!(err.to_string().contains("bad line format"));

        let err = parse_geo("0 t\nN a\n").unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_read_geo_file() {
        let path = std::env::temp_dir().join(format!("fastcap_io_{}.geo", std::process::id()));
        std::fs::write(&path, PLATES).unwrap();
        let s = read_geo(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(s.panel_count(), 3);

        let err = read_geo("/nonexistent/dir/file.geo").unwrap_err();
        assert!(matches!(err, FastcapError::Io(_)));
    }

    #[test]
    fn test_parse_list() {
        let text = "* two linked halves and a shell
G BUS
C left.geo 1.0 0 0 0 +
c right.geo 2.0 1 0 0

C top.geo 3.9 0 0 2.5
D shell.geo 1.0 4.0 0 0 0  0 0 0 -
";
        let entries = parse_list(text).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].file, PathBuf::from("left.geo"));
        assert_eq!(entries[0].options.group.as_deref(), Some("BUS"));
        assert!(!entries[0].options.link);
        assert!(entries[1].options.link);
        assert_eq!(entries[1].options.displacement, [1.0, 0.0, 0.0]);
        assert_eq!(entries[1].options.kind, SurfaceKind::Conductor { outer_perm: 2.0 });
        assert_eq!(entries[2].options.group, None);
        assert!(!entries[2].options.link);
        assert_eq!(
            entries[3].options.kind,
            SurfaceKind::Dielectric {
                outer_perm: 1.0,
                inner_perm: 4.0,
                reference: Some([0.0; 3]),
                reference_inside: true,
            }
        );
    }

    #[test]
    fn test_bad_list_records() {
        let err = parse_list("C a.geo 1.0 0 0\n").unwrap_err();
        assert!(matches!(err, FastcapError::Parse { line: 1, .. }));
        let err = parse_list("* c\nD a.geo 1 2 0 0 0 0 0 x\n").unwrap_err();
        assert!(matches!(err, FastcapError::Parse { line: 2, .. }));
        assert!(parse_list("B a.geo 1 2 0 0 0 0 0 0\n").is_err());
        assert!(parse_list("C a.geo 1 0 0 0 ++\n").is_err());
        assert!(parse_list("Z nothing\n").unwrap_err().is_input_error());
    }
}
