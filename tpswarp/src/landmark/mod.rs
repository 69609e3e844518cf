//! Landmark pair store
//!
//! A [`LandmarkPair`] is a correspondence between a point on the source shape
//! and a point on the destination shape.  Either side may be missing while the
//! user is mid-edit; only [complete](LandmarkPair::is_complete) pairs take part
//! in solving.
use crate::{Error, types::LandmarkId};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

pub mod csv;

/// Which side of a landmark pair is being referred to
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Input {
    /// Point on the source shape
    Source,
    /// Point on the destination shape
    Destination,
}

/// Possibly-incomplete pairing between a source and destination location
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPair {
    /// Stable identity
    pub id: LandmarkId,
    /// Human-readable name, unique within a document
    pub name: String,
    /// Location on the source shape, if placed
    pub source: Option<Point3<f64>>,
    /// Location on the destination shape, if placed
    pub destination: Option<Point3<f64>>,
}

impl LandmarkPair {
    fn new(id: LandmarkId, name: String) -> Self {
        Self {
            id,
            name,
            source: None,
            destination: None,
        }
    }

    /// Checks whether both sides are placed
    pub fn is_complete(&self) -> bool {
        self.source.is_some() && self.destination.is_some()
    }

    /// Returns `(source, destination)` if the pair is complete
    pub fn locations(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        Some((self.source?, self.destination?))
    }

    /// Returns the location on the given side
    pub fn get(&self, input: Input) -> Option<Point3<f64>> {
        match input {
            Input::Source => self.source,
            Input::Destination => self.destination,
        }
    }

    fn get_mut(&mut self, input: Input) -> &mut Option<Point3<f64>> {
        match input {
            Input::Source => &mut self.source,
            Input::Destination => &mut self.destination,
        }
    }
}

/// Point that is tracked (e.g. for export) but does not influence the warp
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NonParticipatingLandmark {
    /// Stable identity
    pub id: LandmarkId,
    /// Human-readable name, unique among non-participating landmarks
    pub name: String,
    /// Location on the source shape
    pub location: Point3<f64>,
}

/// Ordered, identity-stable collection of landmarks
///
/// Insertion order is preserved, so that user-facing lists don't jump around
/// as pairs are edited.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkPairs {
    pairs: Vec<LandmarkPair>,
    non_participating: Vec<NonParticipatingLandmark>,
}

impl LandmarkPairs {
    /// Builds an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new pair with neither side set
    pub fn add_pair(&mut self, id: LandmarkId) -> Result<(), Error> {
        if self.contains(id) {
            return Err(Error::DuplicateIdentifier(id.to_string()));
        }
        let name = self.next_landmark_name();
        self.pairs.push(LandmarkPair::new(id, name));
        Ok(())
    }

    /// Sets the source side of the given pair
    pub fn set_source(
        &mut self,
        id: LandmarkId,
        p: Point3<f64>,
    ) -> Result<(), Error> {
        self.set_location(id, Input::Source, p)
    }

    /// Sets the destination side of the given pair
    pub fn set_destination(
        &mut self,
        id: LandmarkId,
        p: Point3<f64>,
    ) -> Result<(), Error> {
        self.set_location(id, Input::Destination, p)
    }

    /// Sets one side of the given pair
    pub fn set_location(
        &mut self,
        id: LandmarkId,
        input: Input,
        p: Point3<f64>,
    ) -> Result<(), Error> {
        *self.get_mut(id)?.get_mut(input) = Some(p);
        Ok(())
    }

    /// Removes one side of the given pair
    ///
    /// If the pair no longer has either side, it is removed entirely.
    pub fn clear_location(
        &mut self,
        id: LandmarkId,
        input: Input,
    ) -> Result<(), Error> {
        let pair = self.get_mut(id)?;
        *pair.get_mut(input) = None;
        if pair.source.is_none() && pair.destination.is_none() {
            self.pairs.retain(|p| p.id != id);
        }
        Ok(())
    }

    /// Moves one side of the given pair by `offset`
    ///
    /// Returns `false` if that side is not placed.
    pub fn translate(
        &mut self,
        id: LandmarkId,
        input: Input,
        offset: Vector3<f64>,
    ) -> Result<bool, Error> {
        match self.get_mut(id)?.get_mut(input) {
            Some(p) => {
                *p += offset;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes a pair, preserving the order of the remaining pairs
    pub fn remove_pair(&mut self, id: LandmarkId) -> Result<(), Error> {
        let i = self
            .pairs
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::UnknownIdentifier(id.to_string()))?;
        self.pairs.remove(i);
        Ok(())
    }

    /// Renames a pair
    ///
    /// Fails with [`Error::DuplicateIdentifier`] if another pair or
    /// non-participating landmark already has that name.
    pub fn rename_pair(&mut self, id: LandmarkId, name: &str) -> Result<(), Error> {
        self.check_name_is_free(id, name)?;
        self.get_mut(id)?.name = name.to_owned();
        Ok(())
    }

    /// Removes every pair, keeping non-participating landmarks
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Removes every non-participating landmark
    pub fn clear_non_participating(&mut self) {
        self.non_participating.clear();
    }

    /// Checks whether any pair or non-participating landmark has this name
    pub fn contains_name(&self, name: &str) -> bool {
        self.pairs.iter().any(|p| p.name == name)
            || self.non_participating.iter().any(|p| p.name == name)
    }

    /// Returns an error if `name` belongs to any element other than `id`
    fn check_name_is_free(&self, id: LandmarkId, name: &str) -> Result<(), Error> {
        let taken = self
            .pairs
            .iter()
            .map(|p| (p.id, p.name.as_str()))
            .chain(self.non_participating.iter().map(|p| (p.id, p.name.as_str())))
            .any(|(other, n)| other != id && n == name);
        if taken {
            Err(Error::DuplicateIdentifier(name.to_owned()))
        } else {
            Ok(())
        }
    }

    /// Iterates over complete pairs as `(source, destination)`, in order
    ///
    /// Incomplete pairs are skipped.  The iterator is lazy and can be cloned
    /// to restart it.
    pub fn complete_pairs(
        &self,
    ) -> impl Iterator<Item = (Point3<f64>, Point3<f64>)> + Clone + '_ {
        self.pairs.iter().filter_map(LandmarkPair::locations)
    }

    /// Returns every pair, complete or not, in insertion order
    pub fn pairs(&self) -> &[LandmarkPair] {
        &self.pairs
    }

    /// Looks up a pair by identity
    pub fn get(&self, id: LandmarkId) -> Option<&LandmarkPair> {
        self.pairs.iter().find(|p| p.id == id)
    }

    fn get_mut(&mut self, id: LandmarkId) -> Result<&mut LandmarkPair, Error> {
        self.pairs
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::UnknownIdentifier(id.to_string()))
    }

    /// Checks whether a pair or non-participating landmark has this identity
    pub fn contains(&self, id: LandmarkId) -> bool {
        self.pairs.iter().any(|p| p.id == id)
            || self.non_participating.iter().any(|p| p.id == id)
    }

    /// Looks up a pair by name
    pub fn find_by_name(&self, name: &str) -> Option<&LandmarkPair> {
        self.pairs.iter().find(|p| p.name == name)
    }

    /// Number of pairs, complete or not
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Checks whether there are no pairs
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of complete pairs
    pub fn num_complete(&self) -> usize {
        self.pairs.iter().filter(|p| p.is_complete()).count()
    }

    /// Number of pairs with the given side placed
    pub fn num_for_input(&self, input: Input) -> usize {
        self.pairs.iter().filter(|p| p.get(input).is_some()).count()
    }

    /// Returns the next unused generated pair name (`landmark_N`)
    pub fn next_landmark_name(&self) -> String {
        next_unique_name(self.pairs.iter().map(|p| p.name.as_str()), "landmark_")
    }

    /// Returns the next unused non-participating name (`datapoint_N`)
    pub fn next_non_participating_name(&self) -> String {
        next_unique_name(
            self.non_participating.iter().map(|p| p.name.as_str()),
            "datapoint_",
        )
    }

    /// Places a landmark on one side of the document
    ///
    /// With a name, the pair of that name is updated (or created).  Without
    /// one, the location fills the first pair missing that side, so that
    /// landmarks placed in order are paired in order; if every pair already
    /// has that side, a new half-pair is appended.
    ///
    /// Returns the identity of the pair that was touched.
    pub fn add_landmark_to_input(
        &mut self,
        input: Input,
        position: Point3<f64>,
        name: Option<&str>,
    ) -> LandmarkId {
        let slot = match name {
            Some(name) => self.pairs.iter().position(|p| p.name == name),
            None => self.pairs.iter().position(|p| p.get(input).is_none()),
        };
        let i = slot.unwrap_or_else(|| {
            let name = match name {
                Some(name) => name.to_owned(),
                None => self.next_landmark_name(),
            };
            self.pairs.push(LandmarkPair::new(LandmarkId::new(), name));
            self.pairs.len() - 1
        });
        let pair = &mut self.pairs[i];
        *pair.get_mut(input) = Some(position);
        pair.id
    }

    /// Adds (or, with a matching name, moves) a non-participating landmark
    pub fn add_non_participating(
        &mut self,
        location: Point3<f64>,
        name: Option<&str>,
    ) -> LandmarkId {
        if let Some(p) = name.and_then(|name| {
            self.non_participating.iter_mut().find(|p| p.name == name)
        }) {
            p.location = location;
            return p.id;
        }
        let name = match name {
            Some(name) => name.to_owned(),
            None => self.next_non_participating_name(),
        };
        let id = LandmarkId::new();
        self.non_participating.push(NonParticipatingLandmark {
            id,
            name,
            location,
        });
        id
    }

    /// Removes a non-participating landmark
    pub fn remove_non_participating(
        &mut self,
        id: LandmarkId,
    ) -> Result<(), Error> {
        let i = self
            .non_participating
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::UnknownIdentifier(id.to_string()))?;
        self.non_participating.remove(i);
        Ok(())
    }

    /// Moves a non-participating landmark
    pub fn set_non_participating_location(
        &mut self,
        id: LandmarkId,
        location: Point3<f64>,
    ) -> Result<(), Error> {
        self.get_non_participating_mut(id)?.location = location;
        Ok(())
    }

    /// Renames a non-participating landmark
    ///
    /// Names are shared with pairs, so this fails with
    /// [`Error::DuplicateIdentifier`] if any other element has that name.
    pub fn rename_non_participating(
        &mut self,
        id: LandmarkId,
        name: &str,
    ) -> Result<(), Error> {
        self.check_name_is_free(id, name)?;
        self.get_non_participating_mut(id)?.name = name.to_owned();
        Ok(())
    }

    fn get_non_participating_mut(
        &mut self,
        id: LandmarkId,
    ) -> Result<&mut NonParticipatingLandmark, Error> {
        self.non_participating
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::UnknownIdentifier(id.to_string()))
    }

    /// Returns every non-participating landmark, in insertion order
    pub fn non_participating(&self) -> &[NonParticipatingLandmark] {
        &self.non_participating
    }
}

fn next_unique_name<'a, I>(names: I, prefix: &str) -> String
where
    I: Iterator<Item = &'a str> + Clone,
{
    let mut i = 0usize;
    loop {
        let candidate = format!("{prefix}{i}");
        if !names.clone().any(|n| n == candidate) {
            return candidate;
        }
        i += 1;
    }
}
