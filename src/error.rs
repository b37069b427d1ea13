//! Cross-cutting error types — `spec.md` §7's error-kind taxonomy.
//!
//! Most failures already carry a precise, module-scoped `thiserror` enum
//! (`ConfigError`, `BlockCodecError`, `GeometryError`, `CryptoError`,
//! `CompressionError`, `ReassemblyError`). This module only adds the kinds
//! that don't have an obvious single owning module: whole-file integrity
//! failure (kind 3) and the step machines' top-level error, which wraps
//! whichever of the above actually fired.

use thiserror::Error;

use crate::config::ConfigError;
use crate::decoder::gridlock::GridLockError;
use crate::reassembler::ReassemblyError;

/// Whole-stream `filecrc` mismatch after decrypt/decompress (`spec.md` §7
/// kind 3). Distinct from [`ReassemblyError::IntegrityMismatch`], which is
/// the same check surfaced through the reassembler's slot-based API; this
/// variant exists for callers that verify `filecrc` directly.
#[derive(Error, Debug)]
#[error("whole-file integrity check failed: filecrc mismatch")]
pub struct IntegrityError;

/// Top-level error a step machine (`encode::EncodeState`,
/// `decode::DecodeState`) can record on itself when a step fails
/// (`spec.md` §5: "release buffers, set step=0, error recorded on state").
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Compression(#[from] crate::compression::CompressionError),
    #[error(transparent)]
    Crypto(#[from] crate::crypto::CryptoError),
    #[error(transparent)]
    Geometry(#[from] crate::geometry::GeometryError),
    #[error(transparent)]
    GridLock(#[from] GridLockError),
    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),
    #[error("input file too large: {0} bytes exceeds MAXSIZE")]
    FileTooLarge(u64),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_wraps_config_error() {
        let err: StepError = ConfigError::DpiOutOfRange(1).into();
        assert!(matches!(err, StepError::Config(_)));
    }
}
