//! Editable warp document
use crate::{
    Error,
    eval::{Evaluator, ThreadPool},
    landmark::{
        Input, LandmarkPairs, NonParticipatingLandmark, csv::read_landmarks,
    },
    mesh::Mesh,
    solver::{AffineFlags, MIN_PAIRS, SolvedWarp, SolverInputs, solve},
    types::{LandmarkId, Normalized, VersionId},
    validate::{ValidationCheck, ValidationCheckable},
};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::{io::Read, ops::ControlFlow};

/// Landmarks, meshes, and warp settings for one warp group
///
/// Every successful mutation assigns a fresh [`VersionId`], which downstream
/// caches use to tell whether their results are stale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WarpDocument {
    landmarks: LandmarkPairs,
    source_mesh: Option<Mesh>,
    destination_mesh: Option<Mesh>,
    blending_factor: Normalized,
    recalculate_normals: bool,
    flags: AffineFlags,
    source_prescale: f64,
    destination_prescale: f64,
    version: VersionId,
}

impl Default for WarpDocument {
    fn default() -> Self {
        Self {
            landmarks: LandmarkPairs::new(),
            source_mesh: None,
            destination_mesh: None,
            blending_factor: Normalized::ONE,
            recalculate_normals: false,
            flags: AffineFlags::default(),
            source_prescale: 1.0,
            destination_prescale: 1.0,
            version: VersionId::new(),
        }
    }
}

impl WarpDocument {
    /// Builds an empty document with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Current version of the document
    pub fn version(&self) -> VersionId {
        self.version
    }

    fn bump(&mut self) {
        self.version = VersionId::new();
    }

    /// Runs a fallible mutation, bumping the version if it succeeds
    fn edit<T, F>(&mut self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut LandmarkPairs) -> Result<T, Error>,
    {
        let out = f(&mut self.landmarks)?;
        self.bump();
        Ok(out)
    }

    /// Returns the landmark store
    pub fn landmarks(&self) -> &LandmarkPairs {
        &self.landmarks
    }

    /// See [`LandmarkPairs::add_pair`]
    pub fn add_pair(&mut self, id: LandmarkId) -> Result<(), Error> {
        self.edit(|lm| lm.add_pair(id))
    }

    /// See [`LandmarkPairs::set_source`]
    pub fn set_source(
        &mut self,
        id: LandmarkId,
        p: Point3<f64>,
    ) -> Result<(), Error> {
        self.edit(|lm| lm.set_source(id, p))
    }

    /// See [`LandmarkPairs::set_destination`]
    pub fn set_destination(
        &mut self,
        id: LandmarkId,
        p: Point3<f64>,
    ) -> Result<(), Error> {
        self.edit(|lm| lm.set_destination(id, p))
    }

    /// See [`LandmarkPairs::clear_location`]
    pub fn clear_location(
        &mut self,
        id: LandmarkId,
        input: Input,
    ) -> Result<(), Error> {
        self.edit(|lm| lm.clear_location(id, input))
    }

    /// See [`LandmarkPairs::translate`]
    pub fn translate(
        &mut self,
        id: LandmarkId,
        input: Input,
        offset: Vector3<f64>,
    ) -> Result<bool, Error> {
        self.edit(|lm| lm.translate(id, input, offset))
    }

    /// See [`LandmarkPairs::remove_pair`]
    pub fn remove_pair(&mut self, id: LandmarkId) -> Result<(), Error> {
        self.edit(|lm| lm.remove_pair(id))
    }

    /// See [`LandmarkPairs::add_landmark_to_input`]
    pub fn add_landmark_to_input(
        &mut self,
        input: Input,
        position: Point3<f64>,
        name: Option<&str>,
    ) -> LandmarkId {
        self.bump();
        self.landmarks.add_landmark_to_input(input, position, name)
    }

    /// See [`LandmarkPairs::add_non_participating`]
    pub fn add_non_participating(
        &mut self,
        location: Point3<f64>,
        name: Option<&str>,
    ) -> LandmarkId {
        self.bump();
        self.landmarks.add_non_participating(location, name)
    }

    /// See [`LandmarkPairs::remove_non_participating`]
    pub fn remove_non_participating(
        &mut self,
        id: LandmarkId,
    ) -> Result<(), Error> {
        self.edit(|lm| lm.remove_non_participating(id))
    }

    /// See [`LandmarkPairs::rename_pair`]
    pub fn rename_pair(&mut self, id: LandmarkId, name: &str) -> Result<(), Error> {
        self.edit(|lm| lm.rename_pair(id, name))
    }

    /// See [`LandmarkPairs::set_non_participating_location`]
    pub fn set_non_participating_location(
        &mut self,
        id: LandmarkId,
        location: Point3<f64>,
    ) -> Result<(), Error> {
        self.edit(|lm| lm.set_non_participating_location(id, location))
    }

    /// See [`LandmarkPairs::rename_non_participating`]
    pub fn rename_non_participating(
        &mut self,
        id: LandmarkId,
        name: &str,
    ) -> Result<(), Error> {
        self.edit(|lm| lm.rename_non_participating(id, name))
    }

    /// Removes every landmark pair
    pub fn clear_landmarks(&mut self) {
        self.landmarks.clear();
        self.bump();
    }

    /// Removes every non-participating landmark
    pub fn clear_non_participating(&mut self) {
        self.landmarks.clear_non_participating();
        self.bump();
    }

    /// Reads landmarks from a CSV stream into one side of the document
    ///
    /// Named rows update the pair of that name; unnamed rows fill pairs in
    /// order.  Returns the number of landmarks read.  Nothing is modified if
    /// the stream fails to parse.
    pub fn load_landmarks<R: Read>(
        &mut self,
        input: Input,
        r: R,
    ) -> Result<usize, Error> {
        let rows = read_landmarks(r)?;
        for row in &rows {
            self.landmarks.add_landmark_to_input(
                input,
                row.position,
                row.name.as_deref(),
            );
        }
        self.bump();
        Ok(rows.len())
    }

    /// Reads non-participating landmarks from a CSV stream
    ///
    /// Named rows move the non-participating landmark of that name, if there
    /// is one.  Returns the number of landmarks read; nothing is modified if
    /// the stream fails to parse.
    pub fn load_non_participating<R: Read>(&mut self, r: R) -> Result<usize, Error> {
        let rows = read_landmarks(r)?;
        for row in &rows {
            self.landmarks
                .add_non_participating(row.position, row.name.as_deref());
        }
        self.bump();
        Ok(rows.len())
    }

    /// Returns the mesh on the given side, if set
    pub fn mesh(&self, input: Input) -> Option<&Mesh> {
        match input {
            Input::Source => self.source_mesh.as_ref(),
            Input::Destination => self.destination_mesh.as_ref(),
        }
    }

    /// Sets or clears the mesh on the given side
    pub fn set_mesh(&mut self, input: Input, mesh: Option<Mesh>) {
        match input {
            Input::Source => self.source_mesh = mesh,
            Input::Destination => self.destination_mesh = mesh,
        }
        self.bump();
    }

    /// Returns the blending factor
    pub fn blending_factor(&self) -> Normalized {
        self.blending_factor
    }

    /// Sets the blending factor, where `0` is no warp and `1` is full warp
    pub fn set_blending_factor(&mut self, blend: impl Into<Normalized>) {
        self.blending_factor = blend.into();
        self.bump();
    }

    /// Returns whether warped meshes get recomputed normals
    pub fn recalculate_normals(&self) -> bool {
        self.recalculate_normals
    }

    /// Sets whether warped meshes get recomputed normals
    pub fn set_recalculate_normals(&mut self, v: bool) {
        self.recalculate_normals = v;
        self.bump();
    }

    /// Returns the affine toggles
    pub fn flags(&self) -> AffineFlags {
        self.flags
    }

    /// Sets the affine toggles
    pub fn set_flags(&mut self, flags: AffineFlags) {
        self.flags = flags;
        self.bump();
    }

    /// Returns the multiplier applied to source landmarks before solving
    pub fn source_prescale(&self) -> f64 {
        self.source_prescale
    }

    /// Sets the multiplier applied to source landmarks before solving
    pub fn set_source_prescale(&mut self, v: f64) {
        self.source_prescale = v;
        self.bump();
    }

    /// Returns the multiplier applied to destination landmarks before solving
    pub fn destination_prescale(&self) -> f64 {
        self.destination_prescale
    }

    /// Sets the multiplier applied to destination landmarks before solving
    pub fn set_destination_prescale(&mut self, v: f64) {
        self.destination_prescale = v;
        self.bump();
    }

    /// Builds solver inputs from complete pairs and the current settings
    pub fn solver_inputs(&self) -> SolverInputs {
        SolverInputs {
            pairs: self.landmarks.complete_pairs().collect(),
            flags: self.flags,
            source_prescale: self.source_prescale,
            destination_prescale: self.destination_prescale,
        }
    }

    /// Solves for this document's warp with the default solver
    pub fn solve(&self) -> Result<SolvedWarp, Error> {
        solve(&self.solver_inputs())
    }

    /// Builds an evaluator applying `warp` with this document's settings
    pub fn evaluator<'a>(
        &self,
        warp: &'a SolvedWarp,
        threads: Option<&'a ThreadPool>,
    ) -> Evaluator<'a> {
        Evaluator::new(warp)
            .with_blend(self.blending_factor)
            .with_recalculate_normals(self.recalculate_normals)
            .with_threads(threads)
    }

    /// Returns the source mesh, warped by `warp`
    pub fn warped_source_mesh(
        &self,
        warp: &SolvedWarp,
        threads: Option<&ThreadPool>,
    ) -> Option<Mesh> {
        let mesh = self.source_mesh.as_ref()?;
        Some(self.evaluator(warp, threads).mesh(mesh))
    }

    /// Returns the non-participating landmarks, moved by `warp`
    ///
    /// Names and identities are kept, so the result can be exported with
    /// [`write_non_participating`](crate::landmark::csv::write_non_participating).
    pub fn warped_non_participating(
        &self,
        warp: &SolvedWarp,
        threads: Option<&ThreadPool>,
    ) -> Vec<NonParticipatingLandmark> {
        let mut out = self.landmarks.non_participating().to_vec();
        let mut points = out.iter().map(|p| p.location).collect::<Vec<_>>();
        self.evaluator(warp, threads).points_in_place(&mut points);
        for (lm, p) in out.iter_mut().zip(points) {
            lm.location = p;
        }
        out
    }
}

impl ValidationCheckable for WarpDocument {
    fn for_each_check(
        &self,
        f: &mut dyn FnMut(ValidationCheck) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        f(ValidationCheck::error_unless(
            "at least four landmarks are fully paired",
            self.landmarks.num_complete() >= MIN_PAIRS,
        ))?;
        f(ValidationCheck::warning_unless(
            "there are no unpaired landmarks",
            self.landmarks.num_complete() == self.landmarks.len(),
        ))?;
        let finite = |p: &Point3<f64>| p.iter().all(|v| v.is_finite());
        f(ValidationCheck::error_unless(
            "every landmark location is finite",
            self.landmarks
                .pairs()
                .iter()
                .flat_map(|p| p.source.iter().chain(&p.destination))
                .all(finite),
        ))?;
        f(ValidationCheck::warning_unless(
            "every non-participating landmark location is finite",
            self.landmarks
                .non_participating()
                .iter()
                .all(|p| finite(&p.location)),
        ))?;
        f(ValidationCheck::error_unless(
            "source prescale is finite and non-zero",
            self.source_prescale.is_normal(),
        ))?;
        f(ValidationCheck::error_unless(
            "destination prescale is finite and non-zero",
            self.destination_prescale.is_normal(),
        ))?;
        f(ValidationCheck::warning_unless(
            "at least one warp component is enabled",
            self.flags.any(),
        ))?;
        if let (Some(a), Some(b)) = (&self.source_mesh, &self.destination_mesh)
        {
            f(ValidationCheck::warning_unless(
                "source and destination meshes have the same topology",
                a.same_topology(b),
            ))?;
        }
        ControlFlow::Continue(())
    }
}
