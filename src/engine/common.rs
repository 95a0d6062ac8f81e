// src/engine/common.rs
//
// Common utilities shared across engine modules.

use crate::error::ImageLabError;
use std::panic::{self, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, ImageLabError>;

/// Run a codec call, turning a panic into `InternalPanic`.
///
/// mozjpeg reports fatal libjpeg errors by unwinding, and a malformed upload
/// must fail its own request instead of taking the process down.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::warn!(stage, %detail, "codec panicked");
            Err(ImageLabError::internal_panic(format!(
                "{stage} panicked: {detail}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_through_ok_and_err() {
        assert_eq!(run_with_panic_policy("ok", || Ok(3)).unwrap(), 3);
        let err = run_with_panic_policy::<(), _>("err", || {
            Err(ImageLabError::decode_failed("bad"))
        })
        .unwrap_err();
        assert!(matches!(err, ImageLabError::DecodeFailed { .. }));
    }

    #[test]
    fn test_converts_panic_to_internal_error() {
        let err = run_with_panic_policy::<(), _>("decode:test", || panic!("boom")).unwrap_err();
        assert!(matches!(err, ImageLabError::InternalPanic { .. }));
        assert!(err.to_string().contains("decode:test"));
        assert!(err.to_string().contains("boom"));
    }
}
