// ignition/src/errors.rs
// Boot failure taxonomy and propagation

use core::fmt;

use crate::elf::ValidationError;
use crate::handoff::Stage;
use crate::loader::LoadError;

/// Top-level boot failures. Every variant is fatal: the pipeline aborts
/// before control transfer, with no retries. Absent display or font
/// resources are deliberately not represented here; they degrade to null
/// hand-off pointers instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// The kernel image cannot be opened on the boot volume.
    KernelMissing,
    /// The image failed an identity check of the fixed header.
    ImageInvalid(ValidationError),
    /// A segment could not be read or placed at its mandated address.
    Load(LoadError),
    /// The pipeline was driven out of its linear stage order.
    SequenceViolation { from: Stage, to: Stage },
}

impl From<ValidationError> for BootError {
    fn from(error: ValidationError) -> Self {
        BootError::ImageInvalid(error)
    }
}

impl From<LoadError> for BootError {
    fn from(error: LoadError) -> Self {
        BootError::Load(error)
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::KernelMissing => write!(f, "kernel image not accessible"),
            BootError::ImageInvalid(e) => write!(f, "kernel image rejected: {}", e),
            BootError::Load(e) => write!(f, "segment mapping failed: {}", e),
            BootError::SequenceViolation { from, to } => {
                write!(f, "illegal stage transition {} -> {}", from, to)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_stage_errors() {
        let err: BootError = ValidationError::UnsupportedClass(1).into();
        assert_eq!(err, BootError::ImageInvalid(ValidationError::UnsupportedClass(1)));
        let err: BootError = LoadError::ShortRead.into();
        assert_eq!(err, BootError::Load(LoadError::ShortRead));
    }
}
