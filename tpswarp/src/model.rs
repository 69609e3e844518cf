//! Minimal model representation
//!
//! A [`Model`] is a flat, ordered list of named components.  Each component is
//! one of a closed set of kinds; only some kinds can be warped.
use crate::{Error, mesh::Mesh};
use nalgebra::{Isometry3, Point3};
use serde::{Deserialize, Serialize};

/// What a component is
#[derive(
    Clone, Debug, PartialEq, Serialize, Deserialize, strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ComponentKind {
    /// The fixed world frame
    Ground,
    /// Rigid body, with its frame relative to ground
    Body {
        /// Position and orientation of the body
        frame: Isometry3<f64>,
    },
    /// Connection between two named components
    Joint {
        /// Name of the parent component
        parent: String,
        /// Name of the child component
        child: String,
    },
    /// Mesh geometry, in ground coordinates
    Mesh(Mesh),
    /// Fixed point of interest, in ground coordinates
    Station {
        /// Location of the point
        location: Point3<f64>,
    },
}

impl ComponentKind {
    /// Returns a short name for the kind (e.g. `"body"`)
    pub fn name(&self) -> &'static str {
        self.into()
    }
}

/// Named component within a model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Name, unique within the model
    pub name: String,
    /// Payload
    pub kind: ComponentKind,
}

/// Ordered collection of uniquely named components
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    components: Vec<Component>,
}

impl Model {
    /// Builds an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a component
    ///
    /// Returns [`Error::DuplicateIdentifier`] if the name is taken.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        kind: ComponentKind,
    ) -> Result<(), Error> {
        let name = name.into();
        if self.find(&name).is_some() {
            return Err(Error::DuplicateIdentifier(name));
        }
        self.components.push(Component { name, kind });
        Ok(())
    }

    /// Looks up a component by name
    pub fn find(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Replaces the payload of a named component
    pub fn set_kind(
        &mut self,
        name: &str,
        kind: ComponentKind,
    ) -> Result<(), Error> {
        let c = self
            .components
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::UnknownIdentifier(name.to_owned()))?;
        c.kind = kind;
        Ok(())
    }

    /// Returns every component, in insertion order
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Checks whether the model has no components
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn add_and_find() {
        let mut model = Model::new();
        model.add("ground", ComponentKind::Ground).unwrap();
        model
            .add(
                "tip",
                ComponentKind::Station {
                    location: Point3::new(1.0, 2.0, 3.0),
                },
            )
            .unwrap();
        assert!(matches!(
            model.add("tip", ComponentKind::Ground),
            Err(Error::DuplicateIdentifier(..))
        ));
        assert_eq!(model.len(), 2);
        assert_eq!(model.find("tip").unwrap().kind.name(), "station");
        assert!(model.find("nope").is_none());

        model.set_kind("tip", ComponentKind::Ground).unwrap();
        assert_eq!(model.find("tip").unwrap().kind, ComponentKind::Ground);
        assert!(matches!(
            model.set_kind("nope", ComponentKind::Ground),
            Err(Error::UnknownIdentifier(..))
        ));
    }

    #[test]
    fn kind_names() {
        let joint = ComponentKind::Joint {
            parent: "a".to_owned(),
            child: "b".to_owned(),
        };
        assert_eq!(joint.name(), "joint");
        assert_eq!(ComponentKind::Mesh(Mesh::new()).name(), "mesh");
        assert_eq!(
            ComponentKind::Body {
                frame: Isometry3::identity()
            }
            .name(),
            "body"
        );
    }
}
