//! Cached model warping
//!
//! [`CachedModelWarper`] keeps the most recent result for each
//! [`ModelWarpDocument`], keyed by [`DocumentId`].  A result is reused as long
//! as the document's [`Fingerprint`] is unchanged; otherwise it is replaced
//! wholesale.
//!
//! The table lock is only held long enough to find a document's slot.  The
//! slot lock is held for the whole solve, so concurrent requests for the same
//! document wait for (and then reuse) the in-flight result instead of solving
//! again.
use crate::{
    Error,
    eval::ThreadPool,
    model::Model,
    solver::{CoefficientSolver, ThinPlateSolver},
    types::DocumentId,
    warper::{Fingerprint, ModelWarpDocument},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

/// Settings for a [`CachedModelWarper`]
#[derive(Debug)]
pub struct Settings {
    /// Thread pool for batch evaluation, or `None` to run on the calling thread
    pub threads: Option<ThreadPool>,
    /// Return the previous result if solving fails
    pub fallback_to_previous: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threads: Some(ThreadPool::Global),
            fallback_to_previous: false,
        }
    }
}

/// Warped copy of a model, along with the fingerprint it was built from
#[derive(Debug)]
pub struct WarpedModel {
    model: Model,
    fingerprint: Fingerprint,
}

impl WarpedModel {
    /// Returns the warped model
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Returns the fingerprint of the document that produced this model
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

/// Shared handle to a warped model
///
/// Handles stay valid after their cache entry is replaced or evicted.
pub type WarpedModelHandle = Arc<WarpedModel>;

#[derive(Debug)]
struct Entry {
    fingerprint: Fingerprint,
    result: WarpedModelHandle,
}

type Slot = Arc<Mutex<Option<Entry>>>;

/// Warps model documents, reusing results while documents are unchanged
pub struct CachedModelWarper {
    solver: Box<dyn CoefficientSolver>,
    settings: Settings,
    table: Mutex<HashMap<DocumentId, Slot>>,
}

impl Default for CachedModelWarper {
    fn default() -> Self {
        Self::new()
    }
}

impl CachedModelWarper {
    /// Builds a warper with the default solver and settings
    pub fn new() -> Self {
        Self::with_solver(Box::new(ThinPlateSolver), Settings::default())
    }

    /// Builds a warper with a custom solver
    pub fn with_solver(
        solver: Box<dyn CoefficientSolver>,
        settings: Settings,
    ) -> Self {
        Self {
            solver,
            settings,
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the settings in use
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn slot(&self, id: DocumentId) -> Slot {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(id).or_default().clone()
    }

    /// Warps a document, or returns the cached result if it is unchanged
    ///
    /// Fails with [`Error::ValidationFailed`] if any check is in the error
    /// state, [`Error::UnsupportedEntityType`] if the only failing checks are
    /// configured components that can't be warped, or with the solver's error.  If
    /// [`Settings::fallback_to_previous`] is set, a solver failure returns the
    /// document's previous result instead (when there is one).
    pub fn warp(
        &self,
        doc: &ModelWarpDocument,
    ) -> Result<WarpedModelHandle, Error> {
        let fingerprint = doc.fingerprint();
        let slot = self.slot(doc.id());
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(e) = slot.as_ref().filter(|e| e.fingerprint == fingerprint) {
            log::debug!("cache hit for {}", doc.id());
            return Ok(e.result.clone());
        }
        log::debug!("cache miss for {}", doc.id());

        let start = std::time::Instant::now();
        match doc.warp(self.solver.as_ref(), self.settings.threads.as_ref()) {
            Ok(model) => {
                let result = Arc::new(WarpedModel {
                    model,
                    fingerprint: fingerprint.clone(),
                });
                *slot = Some(Entry {
                    fingerprint,
                    result: result.clone(),
                });
                log::info!("warped {} in {:?}", doc.id(), start.elapsed());
                Ok(result)
            }
            Err(e @ (Error::SingularSystem(..) | Error::DuplicateControlPoint(..)))
                if self.settings.fallback_to_previous =>
            {
                match slot.as_ref() {
                    Some(prev) => {
                        log::warn!(
                            "warping {} failed ({e}); using previous result",
                            doc.id()
                        );
                        Ok(prev.result.clone())
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Drops the cached result for a document
    ///
    /// Returns `true` if there was a result to drop.  Outstanding handles stay
    /// valid.  If the document is being warped, this waits for that warp to
    /// finish and then drops its result.
    ///
    /// The slot itself stays in the table, so that concurrent callers keep
    /// sharing one lock per document.
    pub fn evict(&self, id: DocumentId) -> bool {
        let slot = {
            let table =
                self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.get(&id).cloned()
        };
        let Some(slot) = slot else {
            return false;
        };
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        entry.take().is_some()
    }

    /// Number of documents with a cached result
    ///
    /// This waits for any in-flight warps to finish.
    pub fn len(&self) -> usize {
        let slots = {
            let table =
                self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.values().cloned().collect::<Vec<_>>()
        };
        slots
            .iter()
            .filter(|s| {
                s.lock().unwrap_or_else(PoisonError::into_inner).is_some()
            })
            .count()
    }

    /// Checks whether no document has a cached result
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
