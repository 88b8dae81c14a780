//! Module descriptors and the immutable catalog they live in.
//!
//! Each module carries one connector label per face, ordered like
//! [`Direction::ALL`]: +Z, +Y, +X, -Z, -Y, -X. Two modules fit side by side
//! when the labels on their touching faces are equal.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cell::ModuleSet;
use crate::error::{CatalogError, InconsistentBoundaryConstraint};
use crate::geometry::{rotate_faces, Direction};

/// Opaque connector label. Only equality matters.
pub type Label = i32;

/// Stable identity of a module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u32);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An immutable building block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: ModuleId,
    #[serde(default)]
    pub name: String,
    /// Connector label per face in [`Direction::ALL`] order.
    pub faces: [Label; 6],
}

impl Module {
    pub fn new(id: u32, name: impl Into<String>, faces: [Label; 6]) -> Self {
        Self {
            id: ModuleId(id),
            name: name.into(),
            faces,
        }
    }

    #[inline(always)]
    pub fn face(&self, direction: Direction) -> Label {
        self.faces[direction.index()]
    }

    /// Whether `other`, placed one step towards `direction`, touches this
    /// module with a matching connector.
    #[inline]
    pub fn fits(&self, direction: Direction, other: &Module) -> bool {
        self.face(direction) == other.face(direction.opposite())
    }
}

/// A module definition that may expand into several rotated variants.
#[derive(Clone, Debug, Deserialize)]
pub struct ModuleTemplate {
    pub name: String,
    pub faces: [Label; 6],
    /// Number of distinct quarter-turn variants about +Y (1..=4).
    #[serde(default = "default_rotations")]
    pub rotations: u8,
}

fn default_rotations() -> u8 {
    1
}

/// On-disk catalog layout.
#[derive(Deserialize)]
struct CatalogFile {
    modules: Vec<ModuleTemplate>,
}

/// The full, immutable set of modules for one generation run.
///
/// Besides the modules themselves it keeps, per direction, an index from
/// label to the set of modules exposing that label on that face. Propagation
/// answers "does any remaining module still expose label L towards d" with
/// a single mask intersection.
#[derive(Clone, Debug)]
pub struct Catalog {
    modules: Vec<Module>,
    positions: FxHashMap<ModuleId, usize>,
    face_masks: [FxHashMap<Label, ModuleSet>; 6],
}

impl Catalog {
    pub fn new(modules: Vec<Module>) -> Result<Self, CatalogError> {
        if modules.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut positions = FxHashMap::default();
        for (index, module) in modules.iter().enumerate() {
            if positions.insert(module.id, index).is_some() {
                return Err(CatalogError::DuplicateId(module.id));
            }
        }

        let capacity = modules.len();
        let mut face_masks: [FxHashMap<Label, ModuleSet>; 6] = Default::default();
        for (index, module) in modules.iter().enumerate() {
            for dir in Direction::ALL {
                face_masks[dir.index()]
                    .entry(module.face(dir))
                    .or_insert_with(|| ModuleSet::empty(capacity))
                    .insert(index);
            }
        }

        Ok(Self {
            modules,
            positions,
            face_masks,
        })
    }

    /// Expands templates into modules, numbering them in expansion order.
    ///
    /// A template with `rotations = n` yields the base module followed by
    /// `n - 1` successive quarter turns, named `name`, `name_r1`, ...
    pub fn from_templates(templates: &[ModuleTemplate]) -> Result<Self, CatalogError> {
        let mut modules = Vec::new();
        for template in templates {
            if !(1..=4).contains(&template.rotations) {
                return Err(CatalogError::InvalidRotations {
                    name: template.name.clone(),
                    rotations: template.rotations,
                });
            }
            for turn in 0..template.rotations as usize {
                let name = if turn == 0 {
                    template.name.clone()
                } else {
                    format!("{}_r{}", template.name, turn)
                };
                let id = modules.len() as u32;
                modules.push(Module::new(id, name, rotate_faces(template.faces, turn)));
            }
        }
        Self::new(modules)
    }

    /// Parses a JSON catalog of the form
    /// `{"modules": [{"name": "...", "faces": [..6 labels..], "rotations": 4}]}`.
    pub fn from_json(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(source).map_err(|e| CatalogError::Parse(e.to_string()))?;
        Self::from_templates(&file.modules)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Module at catalog position `index`.
    #[inline(always)]
    pub fn module(&self, index: usize) -> &Module {
        &self.modules[index]
    }

    /// Catalog position of a module id.
    pub fn position(&self, id: ModuleId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn by_id(&self, id: ModuleId) -> Option<&Module> {
        self.position(id).map(|index| &self.modules[index])
    }

    /// Every catalog position.
    pub fn all(&self) -> ModuleSet {
        ModuleSet::full(self.len())
    }

    /// Positions of the given ids.
    pub fn subset(&self, ids: &[ModuleId]) -> Result<ModuleSet, CatalogError> {
        let mut set = ModuleSet::empty(self.len());
        for &id in ids {
            let index = self.position(id).ok_or(CatalogError::UnknownModule(id))?;
            set.insert(index);
        }
        Ok(set)
    }

    /// Modules exposing `label` towards `direction`, if any.
    #[inline]
    pub fn with_face(&self, direction: Direction, label: Label) -> Option<&ModuleSet> {
        self.face_masks[direction.index()].get(&label)
    }

    /// Declaration-time check for a boundary requirement.
    pub fn check_face(
        &self,
        direction: Direction,
        label: Label,
    ) -> Result<(), InconsistentBoundaryConstraint> {
        match self.with_face(direction, label) {
            Some(_) => Ok(()),
            None => Err(InconsistentBoundaryConstraint { direction, label }),
        }
    }
}

/// Label for open air around pipes.
pub const AIR: Label = 0;
/// Label for a pipe opening.
pub const PIPE: Label = 1;

/// Templates for the built-in pipe network catalog.
///
/// Face order: +Z, +Y, +X, -Z, -Y, -X.
pub const PIPE_TEMPLATES: &[(&str, [Label; 6], u8)] = &[
    // nothing at all
    ("empty", [AIR, AIR, AIR, AIR, AIR, AIR], 1),
    // straight run along Z, rotated once for X
    ("straight", [PIPE, AIR, AIR, PIPE, AIR, AIR], 2),
    // horizontal elbow +Z / +X
    ("corner", [PIPE, AIR, PIPE, AIR, AIR, AIR], 4),
    // horizontal T
    ("tee", [PIPE, AIR, PIPE, PIPE, AIR, AIR], 4),
    // four-way junction
    ("cross", [PIPE, AIR, PIPE, PIPE, AIR, PIPE], 1),
    // vertical run
    ("riser", [AIR, PIPE, AIR, AIR, PIPE, AIR], 1),
    // bends from horizontal into the vertical
    ("elbow_up", [PIPE, PIPE, AIR, AIR, AIR, AIR], 4),
    ("elbow_down", [PIPE, AIR, AIR, AIR, PIPE, AIR], 4),
];

/// The built-in pipes catalog.
pub fn pipes() -> Catalog {
    let templates: Vec<ModuleTemplate> = PIPE_TEMPLATES
        .iter()
        .map(|&(name, faces, rotations)| ModuleTemplate {
            name: name.to_string(),
            faces,
            rotations,
        })
        .collect();
    match Catalog::from_templates(&templates) {
        Ok(catalog) => catalog,
        // the table above is static and covered by tests
        Err(e) => unreachable!("built-in pipes catalog is invalid: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipes_catalog_size() {
        // 1 + 2 + 4 + 4 + 1 + 1 + 4 + 4
        assert_eq!(pipes().len(), 21);
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert_eq!(Catalog::new(Vec::new()).unwrap_err(), CatalogError::Empty);

        let modules = vec![
            Module::new(7, "a", [0; 6]),
            Module::new(7, "b", [1; 6]),
        ];
        assert_eq!(
            Catalog::new(modules).unwrap_err(),
            CatalogError::DuplicateId(ModuleId(7))
        );
    }

    #[test]
    fn test_face_masks_index_labels() {
        let catalog = Catalog::new(vec![
            Module::new(0, "a", [1, 0, 0, 1, 0, 0]),
            Module::new(1, "b", [2, 0, 0, 1, 0, 0]),
        ])
        .unwrap();

        let forward_one = catalog.with_face(Direction::Forward, 1).unwrap();
        assert_eq!(forward_one.iter().collect::<Vec<_>>(), vec![0]);

        let back_one = catalog.with_face(Direction::Back, 1).unwrap();
        assert_eq!(back_one.len(), 2);

        assert!(catalog.with_face(Direction::Up, 5).is_none());
        assert!(catalog.check_face(Direction::Up, 5).is_err());
        assert!(catalog.check_face(Direction::Up, 0).is_ok());
    }

    #[test]
    fn test_fits_uses_opposite_face() {
        let left = Module::new(0, "left", [0, 0, 3, 0, 0, 0]);
        let right = Module::new(1, "right", [0, 0, 0, 0, 0, 3]);
        assert!(left.fits(Direction::Right, &right));
        assert!(right.fits(Direction::Left, &left));
        assert!(!right.fits(Direction::Right, &left));
    }

    #[test]
    fn test_json_expands_rotations() {
        let source = r#"{
            "modules": [
                {"name": "empty", "faces": [0, 0, 0, 0, 0, 0]},
                {"name": "corner", "faces": [1, 0, 1, 0, 0, 0], "rotations": 4}
            ]
        }"#;
        let catalog = Catalog::from_json(source).unwrap();
        assert_eq!(catalog.len(), 5);
        assert_eq!(catalog.module(2).name, "corner_r1");
        assert_eq!(catalog.module(2).faces, [0, 0, 1, 1, 0, 0]);
        assert_eq!(catalog.by_id(ModuleId(4)).unwrap().name, "corner_r3");
    }

    #[test]
    fn test_json_rejects_bad_rotation_count() {
        let source = r#"{"modules": [{"name": "x", "faces": [0, 0, 0, 0, 0, 0], "rotations": 5}]}"#;
        assert!(matches!(
            Catalog::from_json(source),
            Err(CatalogError::InvalidRotations { rotations: 5, .. })
        ));
        assert!(matches!(
            Catalog::from_json("{"),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_demo_catalog_matches_builtin() {
        let demo = Catalog::from_json(include_str!("../demos/pipes.json")).unwrap();
        assert_eq!(demo.modules(), pipes().modules());
    }

    #[test]
    fn test_subset_rejects_unknown_ids() {
        let catalog = pipes();
        let subset = catalog.subset(&[ModuleId(0), ModuleId(3)]).unwrap();
        assert_eq!(subset.len(), 2);
        assert_eq!(
            catalog.subset(&[ModuleId(99)]).unwrap_err(),
            CatalogError::UnknownModule(ModuleId(99))
        );
    }
}
