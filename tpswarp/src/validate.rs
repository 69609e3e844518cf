//! Validation checklists
//!
//! Anything that can be warped reports a list of [`ValidationCheck`]s through
//! [`ValidationCheckable`].  Checks are recomputed every time they are
//! requested; a check in the [`Error`](ValidationState::Error) state blocks
//! warping, while [`Warning`](ValidationState::Warning) does not.
use std::ops::ControlFlow;

/// Outcome of a single check, ordered from best to worst
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, strum::Display,
)]
pub enum ValidationState {
    /// The check passed
    Ok,
    /// The check failed, but warping can proceed
    Warning,
    /// The check failed and warping is not possible
    Error,
}

/// Human-readable description of a check, along with its outcome
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationCheck {
    /// What was checked, phrased as the condition that should hold
    pub description: String,
    /// Outcome
    pub state: ValidationState,
}

impl ValidationCheck {
    /// Builds a check that is `Ok` if `passed`, and `on_fail` otherwise
    pub fn new(
        description: impl Into<String>,
        passed: bool,
        on_fail: ValidationState,
    ) -> Self {
        Self {
            description: description.into(),
            state: if passed { ValidationState::Ok } else { on_fail },
        }
    }

    /// Builds a check that blocks warping when it fails
    pub fn error_unless(description: impl Into<String>, passed: bool) -> Self {
        Self::new(description, passed, ValidationState::Error)
    }

    /// Builds a check that reports a warning when it fails
    pub fn warning_unless(description: impl Into<String>, passed: bool) -> Self {
        Self::new(description, passed, ValidationState::Warning)
    }
}

impl std::fmt::Display for ValidationCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.state, self.description)
    }
}

/// Trait for things that can report a validation checklist
pub trait ValidationCheckable {
    /// Calls `f` once per check, stopping early if it returns `Break`
    fn for_each_check(
        &self,
        f: &mut dyn FnMut(ValidationCheck) -> ControlFlow<()>,
    ) -> ControlFlow<()>;

    /// Returns the worst state among all checks (`Ok` if there are none)
    fn state(&self) -> ValidationState {
        let mut worst = ValidationState::Ok;
        let _ = self.for_each_check(&mut |c| {
            worst = worst.max(c.state);
            if worst == ValidationState::Error {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });
        worst
    }

    /// Collects every check into a `Vec`
    fn checks(&self) -> Vec<ValidationCheck> {
        let mut out = vec![];
        let _ = self.for_each_check(&mut |c| {
            out.push(c);
            ControlFlow::Continue(())
        });
        out
    }
}
