//! Error types for overlay construction and per-frame work

use thiserror::Error;

/// Errors raised by the window, composition and painter layers.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("{call} failed: {reason}")]
    Platform { call: &'static str, reason: String },

    #[error("unsupported platform: {0}")]
    Unsupported(String),

    #[error("failed to compile {stage} shader: {log}")]
    ShaderCompile { stage: &'static str, log: String },

    #[error("failed to upload texture {id}: {reason}")]
    TextureUpload { id: String, reason: String },

    #[error("failed to resize swap chain to {width}x{height}: {reason}")]
    Resize {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error("failed to present frame: {0}")]
    Present(String),

    #[error("unknown hotkey name '{0}'")]
    InvalidHotkey(String),
}

impl OverlayError {
    /// Whether the frame loop must stop when this error surfaces mid-run.
    ///
    /// Texture uploads only lose visual content and a lost device is
    /// recreated, so neither ends the loop on its own.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            OverlayError::TextureUpload { .. } | OverlayError::DeviceLost(_)
        )
    }
}

#[cfg(target_os = "windows")]
impl OverlayError {
    /// Build a mapper for `windows::core::Error` tagged with the failing call.
    pub(crate) fn win32(call: &'static str) -> impl FnOnce(windows::core::Error) -> OverlayError {
        move |e| OverlayError::Platform {
            call,
            reason: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let upload = OverlayError::TextureUpload {
            id: "Managed(7)".into(),
            reason: "out of memory".into(),
        };
        assert!(!upload.is_fatal());
        assert!(!OverlayError::DeviceLost("removed".into()).is_fatal());
        assert!(OverlayError::Present("busy".into()).is_fatal());
        assert!(
            OverlayError::Resize {
                width: 1,
                height: 1,
                reason: "bad".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_display_names_the_call() {
        let err = OverlayError::Platform {
            call: "CreateWindowExW",
            reason: "access denied".into(),
        };
        assert_eq!(err.to_string(), "CreateWindowExW failed: access denied");
    }
}
