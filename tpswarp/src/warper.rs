//! Per-component warping of a whole model
//!
//! A [`ModelWarpDocument`] owns a [`Model`], any number of named warp groups
//! (each a [`WarpDocument`] with its own landmarks), and a [`WarperConfig`]
//! for every component that should move.  Each configured component is
//! turned into an [`EntityWarper`] matching its kind.
use crate::{
    Error,
    document::WarpDocument,
    eval::{Evaluator, ThreadPool},
    mesh::Mesh,
    model::{Component, ComponentKind, Model},
    solver::{AffineFlags, CoefficientSolver, SolvedWarp},
    types::{DocumentId, VersionId},
    validate::{ValidationCheck, ValidationCheckable, ValidationState},
};
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::ControlFlow, sync::Arc};

/// How a body frame follows the warp
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize,
)]
pub enum FrameWarpMode {
    /// The frame is left in place
    Identity,
    /// The frame origin is warped; orientation is unchanged
    #[default]
    TranslateOnly,
    /// The origin is warped and the frame is rotated by the (orthonormalized)
    /// affine part of the warp
    Affine,
}

/// Tells the model warper to move one component with one warp group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WarperConfig {
    group: String,
    frame_mode: FrameWarpMode,
    version: VersionId,
}

impl WarperConfig {
    /// Builds a config that warps with the named group
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            frame_mode: FrameWarpMode::default(),
            version: VersionId::new(),
        }
    }

    /// Sets the frame mode (only used by body components)
    pub fn with_frame_mode(self, frame_mode: FrameWarpMode) -> Self {
        Self {
            frame_mode,
            version: VersionId::new(),
            ..self
        }
    }

    /// Name of the warp group
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Frame warp mode
    pub fn frame_mode(&self) -> FrameWarpMode {
        self.frame_mode
    }

    /// Current version of this configuration
    pub fn version(&self) -> VersionId {
        self.version
    }
}

/// Composite version of everything that feeds into a model warp
///
/// Two fingerprints are equal only if the model, every warp group, and every
/// warper configuration are unchanged.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Fingerprint {
    document: VersionId,
    groups: Vec<(String, VersionId)>,
    warpers: Vec<(String, VersionId)>,
}

/// Model, warp groups, and per-component warp configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelWarpDocument {
    id: DocumentId,
    version: VersionId,
    model: Arc<Model>,
    groups: BTreeMap<String, WarpDocument>,
    warpers: BTreeMap<String, WarperConfig>,
}

impl ModelWarpDocument {
    /// Builds a document with no warp groups or warpers
    pub fn new(model: impl Into<Arc<Model>>) -> Self {
        Self {
            id: DocumentId::new(),
            version: VersionId::new(),
            model: model.into(),
            groups: BTreeMap::new(),
            warpers: BTreeMap::new(),
        }
    }

    /// Identity of this document, stable across edits
    pub fn id(&self) -> DocumentId {
        self.id
    }

    /// Structural version (model, set of groups, set of warpers)
    pub fn version(&self) -> VersionId {
        self.version
    }

    /// Returns the unwarped model
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Replaces the model
    pub fn set_model(&mut self, model: impl Into<Arc<Model>>) {
        self.model = model.into();
        self.version = VersionId::new();
    }

    /// Adds a named warp group
    pub fn add_group(
        &mut self,
        name: impl Into<String>,
        group: WarpDocument,
    ) -> Result<(), Error> {
        let name = name.into();
        if self.groups.contains_key(&name) {
            return Err(Error::DuplicateIdentifier(name));
        }
        self.groups.insert(name, group);
        self.version = VersionId::new();
        Ok(())
    }

    /// Removes a warp group, returning it
    pub fn remove_group(&mut self, name: &str) -> Result<WarpDocument, Error> {
        let g = self
            .groups
            .remove(name)
            .ok_or_else(|| Error::UnknownIdentifier(name.to_owned()))?;
        self.version = VersionId::new();
        Ok(g)
    }

    /// Looks up a warp group
    pub fn group(&self, name: &str) -> Option<&WarpDocument> {
        self.groups.get(name)
    }

    /// Looks up a warp group for editing
    ///
    /// Edits are tracked by the group's own version.
    pub fn group_mut(&mut self, name: &str) -> Option<&mut WarpDocument> {
        self.groups.get_mut(name)
    }

    /// Iterates over warp groups, sorted by name
    pub fn groups(&self) -> impl Iterator<Item = (&str, &WarpDocument)> {
        self.groups.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Configures (or reconfigures) the warper for a component
    pub fn set_warper(
        &mut self,
        component: impl Into<String>,
        config: WarperConfig,
    ) {
        let config = WarperConfig {
            version: VersionId::new(),
            ..config
        };
        self.warpers.insert(component.into(), config);
    }

    /// Stops warping a component
    pub fn remove_warper(&mut self, component: &str) -> Result<(), Error> {
        self.warpers
            .remove(component)
            .map(|_| ())
            .ok_or_else(|| Error::UnknownIdentifier(component.to_owned()))
    }

    /// Iterates over warper configurations, sorted by component name
    pub fn warpers(&self) -> impl Iterator<Item = (&str, &WarperConfig)> {
        self.warpers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the composite version of everything that affects the warp
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            document: self.version,
            groups: self
                .groups
                .iter()
                .map(|(k, g)| (k.clone(), g.version()))
                .collect(),
            warpers: self
                .warpers
                .iter()
                .map(|(k, w)| (k.clone(), w.version()))
                .collect(),
        }
    }

    /// Builds a warper for every configured component
    ///
    /// Configurations naming a missing component or group are skipped (they're
    /// reported by validation instead); components whose kind cannot be
    /// warped fail with [`Error::UnsupportedEntityType`].
    pub fn entity_warpers(&self) -> Result<Vec<ConfiguredWarper<'_>>, Error> {
        self.configured_warpers().collect()
    }

    /// Builds each configured warper on its own, so that one unsupported
    /// component doesn't hide the others
    fn configured_warpers(
        &self,
    ) -> impl Iterator<Item = Result<ConfiguredWarper<'_>, Error>> + '_ {
        self.warpers.iter().filter_map(|(name, config)| {
            let component = self.model.find(name)?;
            let group = self.groups.get(&config.group)?;
            let out = EntityWarper::new(component, config, group).map(|warper| {
                ConfiguredWarper {
                    component: &component.name,
                    group: &config.group,
                    warper,
                }
            });
            Some(out)
        })
    }

    /// Solves every referenced group and warps every configured component
    ///
    /// Validation runs first.  Failing checks are returned as
    /// [`Error::ValidationFailed`], unless the only failures are unsupported
    /// components, in which case the first of them is returned as
    /// [`Error::UnsupportedEntityType`].
    ///
    /// This does no caching; see
    /// [`CachedModelWarper`](crate::cache::CachedModelWarper) for that.
    pub fn warp(
        &self,
        solver: &dyn CoefficientSolver,
        threads: Option<&ThreadPool>,
    ) -> Result<Model, Error> {
        let mut failing = vec![];
        let _ = self.for_each_check(&mut |c| {
            match c.state {
                ValidationState::Ok => (),
                ValidationState::Warning => log::warn!("{c}"),
                ValidationState::Error => failing.push(c),
            }
            ControlFlow::Continue(())
        });
        // Each unsupported component fails exactly one check.  When those are
        // the only failures, report the more specific error.
        let unsupported = self
            .configured_warpers()
            .filter(|w| w.is_err())
            .count();
        if failing.len() > unsupported {
            return Err(Error::ValidationFailed(failing));
        }
        let warpers = self.entity_warpers()?;

        let mut solved: BTreeMap<&str, SolvedWarp> = BTreeMap::new();
        for w in &warpers {
            if solved.contains_key(w.group) {
                continue;
            }
            let Some(group) = self.groups.get(w.group) else {
                continue;
            };
            solved.insert(w.group, solver.solve(&group.solver_inputs())?);
        }

        let mut model = Model::clone(&self.model);
        for w in &warpers {
            let (Some(group), Some(warp)) =
                (self.groups.get(w.group), solved.get(w.group))
            else {
                continue;
            };
            let eval = group.evaluator(warp, threads);
            model.set_kind(w.component, w.warper.warp(&eval))?;
        }
        Ok(model)
    }
}

impl ValidationCheckable for ModelWarpDocument {
    fn for_each_check(
        &self,
        f: &mut dyn FnMut(ValidationCheck) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        for (name, config) in &self.warpers {
            f(ValidationCheck::error_unless(
                format!("component `{name}` exists in the model"),
                self.model.find(name).is_some(),
            ))?;
            f(ValidationCheck::error_unless(
                format!("warp group `{}` exists", config.group),
                self.groups.contains_key(&config.group),
            ))?;
        }
        for (name, group) in &self.groups {
            if !self.warpers.values().any(|w| &w.group == name) {
                continue;
            }
            group.for_each_check(&mut |c| {
                f(ValidationCheck {
                    description: format!("{name}: {}", c.description),
                    state: c.state,
                })
            })?;
        }
        for w in self.configured_warpers() {
            match w {
                Ok(w) => w.warper.for_each_check(&mut |c| {
                    f(ValidationCheck {
                        description: format!("{}: {}", w.component, c.description),
                        state: c.state,
                    })
                })?,
                Err(Error::UnsupportedEntityType { name, kind }) => {
                    f(ValidationCheck::error_unless(
                        format!("component `{name}` ({kind}) can be warped"),
                        false,
                    ))?
                }
                Err(e) => f(ValidationCheck::error_unless(e.to_string(), false))?,
            }
        }
        ControlFlow::Continue(())
    }
}

/// An [`EntityWarper`] along with where it applies
#[derive(Clone, Debug)]
pub struct ConfiguredWarper<'a> {
    /// Name of the component being warped
    pub component: &'a str,
    /// Name of the warp group doing the warping
    pub group: &'a str,
    /// The warper itself
    pub warper: EntityWarper<'a>,
}

/// Something that can produce a warped version of a model component
pub trait Warpable {
    /// Returns the warped component payload
    fn warp(&self, eval: &Evaluator<'_>) -> ComponentKind;
}

/// Warper for one component, chosen by the component's kind
#[derive(Clone, Debug)]
pub enum EntityWarper<'a> {
    /// Warps every vertex of a mesh
    Mesh(MeshWarper<'a>),
    /// Moves (and possibly rotates) a body frame
    Frame(FrameWarper),
    /// Moves a single point
    Point(PointWarper),
}

impl<'a> EntityWarper<'a> {
    /// Picks the warper for a component
    pub fn new(
        component: &'a Component,
        config: &WarperConfig,
        group: &WarpDocument,
    ) -> Result<Self, Error> {
        let out = match &component.kind {
            ComponentKind::Mesh(mesh) => Self::Mesh(MeshWarper { mesh }),
            ComponentKind::Body { frame } => Self::Frame(FrameWarper {
                frame: *frame,
                mode: config.frame_mode,
                flags: group.flags(),
            }),
            ComponentKind::Station { location } => Self::Point(PointWarper {
                location: *location,
            }),
            kind @ (ComponentKind::Ground | ComponentKind::Joint { .. }) => {
                return Err(Error::UnsupportedEntityType {
                    name: component.name.clone(),
                    kind: kind.name(),
                });
            }
        };
        Ok(out)
    }
}

impl Warpable for EntityWarper<'_> {
    fn warp(&self, eval: &Evaluator<'_>) -> ComponentKind {
        match self {
            Self::Mesh(m) => m.warp(eval),
            Self::Frame(f) => f.warp(eval),
            Self::Point(p) => p.warp(eval),
        }
    }
}

impl ValidationCheckable for EntityWarper<'_> {
    fn for_each_check(
        &self,
        f: &mut dyn FnMut(ValidationCheck) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        match self {
            Self::Mesh(m) => m.for_each_check(f),
            Self::Frame(w) => w.for_each_check(f),
            Self::Point(p) => p.for_each_check(f),
        }
    }
}

/// Warps the vertices of a mesh
#[derive(Clone, Debug)]
pub struct MeshWarper<'a> {
    mesh: &'a Mesh,
}

impl Warpable for MeshWarper<'_> {
    fn warp(&self, eval: &Evaluator<'_>) -> ComponentKind {
        ComponentKind::Mesh(eval.mesh(self.mesh))
    }
}

impl ValidationCheckable for MeshWarper<'_> {
    fn for_each_check(
        &self,
        f: &mut dyn FnMut(ValidationCheck) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        f(ValidationCheck::warning_unless(
            "mesh has vertices",
            !self.mesh.vertices.is_empty(),
        ))
    }
}

/// Warps a body frame according to a [`FrameWarpMode`]
#[derive(Clone, Debug)]
pub struct FrameWarper {
    frame: Isometry3<f64>,
    mode: FrameWarpMode,
    flags: AffineFlags,
}

impl FrameWarper {
    fn warp_frame(&self, eval: &Evaluator<'_>) -> Isometry3<f64> {
        let origin = Point3::from(self.frame.translation.vector);
        match self.mode {
            FrameWarpMode::Identity => self.frame,
            FrameWarpMode::TranslateOnly => Isometry3::from_parts(
                Translation3::from(eval.point(origin).coords),
                self.frame.rotation,
            ),
            FrameWarpMode::Affine => {
                // Column k of the linear map is the coefficient of axis k
                let linear = eval
                    .warp()
                    .affine()
                    .fixed_rows::<3>(1)
                    .transpose()
                    .into_owned();
                let q = UnitQuaternion::from_matrix(&linear)
                    .powf(eval.blend().get());
                Isometry3::from_parts(
                    Translation3::from(eval.point(origin).coords),
                    q * self.frame.rotation,
                )
            }
        }
    }
}

impl Warpable for FrameWarper {
    fn warp(&self, eval: &Evaluator<'_>) -> ComponentKind {
        ComponentKind::Body {
            frame: self.warp_frame(eval),
        }
    }
}

impl ValidationCheckable for FrameWarper {
    fn for_each_check(
        &self,
        f: &mut dyn FnMut(ValidationCheck) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        if self.mode == FrameWarpMode::Affine {
            f(ValidationCheck::error_unless(
                "affine frame warping has translation and rotation enabled",
                self.flags.translation && self.flags.rotation,
            ))?;
        }
        ControlFlow::Continue(())
    }
}

/// Warps a single point
#[derive(Clone, Debug)]
pub struct PointWarper {
    location: Point3<f64>,
}

impl Warpable for PointWarper {
    fn warp(&self, eval: &Evaluator<'_>) -> ComponentKind {
        ComponentKind::Station {
            location: eval.point(self.location),
        }
    }
}

impl ValidationCheckable for PointWarper {
    fn for_each_check(
        &self,
        f: &mut dyn FnMut(ValidationCheck) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        f(ValidationCheck::error_unless(
            "location is finite",
            self.location.iter().all(|v| v.is_finite()),
        ))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{landmark::Input, solver::ThinPlateSolver};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    /// Group whose landmarks rotate 90 degrees about Z and shift by +X
    fn rotating_group() -> WarpDocument {
        let mut g = WarpDocument::new();
        for p in [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ] {
            g.add_landmark_to_input(Input::Source, p, None);
            let q = Point3::new(-p.y, p.x, p.z) + Vector3::x();
            g.add_landmark_to_input(Input::Destination, q, None);
        }
        g
    }

    fn model() -> Model {
        let mut m = Model::new();
        m.add("ground", ComponentKind::Ground).unwrap();
        m.add(
            "femur",
            ComponentKind::Body {
                frame: Isometry3::translation(1.0, 0.0, 0.0),
            },
        )
        .unwrap();
        m.add(
            "marker",
            ComponentKind::Station {
                location: Point3::new(0.0, 1.0, 0.0),
            },
        )
        .unwrap();
        m
    }

    #[test]
    fn fingerprint_tracks_edits() {
        let mut doc = ModelWarpDocument::new(model());
        doc.add_group("g", rotating_group()).unwrap();
        let a = doc.fingerprint();
        assert_eq!(a, doc.fingerprint());

        doc.group_mut("g").unwrap().set_blending_factor(0.5);
        let b = doc.fingerprint();
        assert_ne!(a, b);

        doc.set_warper("marker", WarperConfig::new("g"));
        let c = doc.fingerprint();
        assert_ne!(b, c);

        // Reconfiguring with an identical config still changes the version
        doc.set_warper("marker", WarperConfig::new("g"));
        assert_ne!(c, doc.fingerprint());
    }

    #[test]
    fn unsupported() {
        let mut doc = ModelWarpDocument::new(model());
        doc.add_group("g", rotating_group()).unwrap();
        doc.set_warper("ground", WarperConfig::new("g"));
        match doc.entity_warpers() {
            Err(Error::UnsupportedEntityType { name, kind }) => {
                assert_eq!(name, "ground");
                assert_eq!(kind, "ground");
            }
            r => panic!("unexpected result {r:?}"),
        }
        assert!(matches!(
            doc.warp(&ThinPlateSolver, None),
            Err(Error::UnsupportedEntityType { .. })
        ));
    }

    #[test]
    fn unsupported_components_keep_other_checks() {
        let mut m = model();
        m.set_kind(
            "marker",
            ComponentKind::Station {
                location: Point3::new(f64::NAN, 0.5, 0.5),
            },
        )
        .unwrap();
        let mut doc = ModelWarpDocument::new(m);
        doc.add_group("g", rotating_group()).unwrap();
        doc.set_warper("marker", WarperConfig::new("g"));
        assert_eq!(doc.state(), ValidationState::Error);

        // Adding an unsupported component must not make things look better
        doc.set_warper("ground", WarperConfig::new("g"));
        assert_eq!(doc.state(), ValidationState::Error);
        let failing = doc
            .checks()
            .into_iter()
            .filter(|c| c.state == ValidationState::Error)
            .map(|c| c.description)
            .collect::<Vec<_>>();
        assert_eq!(
            failing,
            vec![
                "component `ground` (ground) can be warped".to_owned(),
                "marker: location is finite".to_owned(),
            ]
        );
    }

    #[test]
    fn validation_comes_before_unsupported() {
        let mut group = rotating_group();
        let id = group.landmarks().pairs()[0].id;
        group.remove_pair(id).unwrap();

        let mut doc = ModelWarpDocument::new(model());
        doc.add_group("g", group).unwrap();
        doc.set_warper("ground", WarperConfig::new("g"));
        let Err(Error::ValidationFailed(checks)) =
            doc.warp(&ThinPlateSolver, None)
        else {
            panic!("expected validation failure");
        };
        assert_eq!(checks.len(), 2);
        assert!(checks[0].description.contains("at least four"));
        assert!(checks[1].description.contains("can be warped"));
    }

    #[test]
    fn missing_references() {
        let mut doc = ModelWarpDocument::new(model());
        doc.add_group("g", rotating_group()).unwrap();
        doc.set_warper("marker", WarperConfig::new("nope"));
        doc.set_warper("tibia", WarperConfig::new("g"));
        assert_eq!(doc.state(), ValidationState::Error);
        let Err(Error::ValidationFailed(checks)) =
            doc.warp(&ThinPlateSolver, None)
        else {
            panic!("expected validation failure");
        };
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().any(|c| c.description.contains("tibia")));
        assert!(checks.iter().any(|c| c.description.contains("nope")));
    }

    #[test]
    fn warp_model() {
        let mut doc = ModelWarpDocument::new(model());
        doc.add_group("g", rotating_group()).unwrap();
        doc.set_warper("marker", WarperConfig::new("g"));
        doc.set_warper(
            "femur",
            WarperConfig::new("g").with_frame_mode(FrameWarpMode::Affine),
        );
        assert_eq!(doc.state(), ValidationState::Ok);

        let out = doc.warp(&ThinPlateSolver, None).unwrap();
        let ComponentKind::Station { location } = out.find("marker").unwrap().kind
        else {
            panic!("marker is not a station");
        };
        assert_relative_eq!(location, Point3::new(0.0, 0.0, 0.0), epsilon = 1e-9);

        let ComponentKind::Body { frame } = out.find("femur").unwrap().kind
        else {
            panic!("femur is not a body");
        };
        assert_relative_eq!(
            frame.translation.vector,
            Vector3::new(1.0, 1.0, 0.0),
            epsilon = 1e-9
        );
        assert_relative_eq!(
            frame.rotation * Vector3::x(),
            Vector3::y(),
            epsilon = 1e-6
        );

        // The unwarped model is untouched
        assert_eq!(**doc.model(), model());
    }

    #[test]
    fn frame_modes() {
        let group = rotating_group();
        let warp = group.solve().unwrap();
        let eval = group.evaluator(&warp, None);
        let frame = Isometry3::translation(0.0, 1.0, 0.0);
        let w = |mode| FrameWarper {
            frame,
            mode,
            flags: AffineFlags::default(),
        };

        assert_eq!(w(FrameWarpMode::Identity).warp_frame(&eval), frame);

        let t = w(FrameWarpMode::TranslateOnly).warp_frame(&eval);
        assert_relative_eq!(t.translation.vector, Vector3::zeros(), epsilon = 1e-9);
        assert_eq!(t.rotation, frame.rotation);
    }

    #[test]
    fn affine_frames_need_rotation() {
        let mut group = rotating_group();
        group.set_flags(AffineFlags {
            rotation: false,
            ..AffineFlags::default()
        });
        let mut doc = ModelWarpDocument::new(model());
        doc.add_group("g", group).unwrap();
        doc.set_warper(
            "femur",
            WarperConfig::new("g").with_frame_mode(FrameWarpMode::Affine),
        );
        assert_eq!(doc.state(), ValidationState::Error);

        doc.set_warper(
            "femur",
            WarperConfig::new("g").with_frame_mode(FrameWarpMode::TranslateOnly),
        );
        assert_eq!(doc.state(), ValidationState::Ok);
    }

    #[test]
    fn entity_checks() {
        let empty = Mesh::new();
        let m = MeshWarper { mesh: &empty };
        assert_eq!(m.state(), ValidationState::Warning);

        let p = PointWarper {
            location: Point3::new(f64::NAN, 0.0, 0.0),
        };
        assert_eq!(p.state(), ValidationState::Error);
    }
}
