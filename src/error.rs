use std::path::PathBuf;

use thiserror::Error;

use crate::shader::ShaderStage;

/// Failures surfaced by the renderer and its startup path.
///
/// Everything except [`RenderError::TextureLoad`] is fatal: the caller tears
/// down what it owns and exits with a failure code.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to initialize {stage}: {message}")]
    WindowInit { stage: &'static str, message: String },

    #[error("ERROR::SHADER::{stage}::COMPILATION_FAILED\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("ERROR::SHADER::PROGRAM::LINKING_FAILED\n{program}: {log}")]
    ShaderLink { program: String, log: String },

    #[error("failed to load texture {}: {reason}", path.display())]
    TextureLoad { path: PathBuf, reason: String },

    #[error("graphics device lost: {0}")]
    DeviceLost(String),
}

impl RenderError {
    pub fn window_init(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::WindowInit {
            stage,
            message: err.to_string(),
        }
    }

    /// Whether the frame loop may keep running after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TextureLoad { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_uses_stage_banner() {
        let err = RenderError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "expected `;`".into(),
        };
        let text = err.to_string();
        assert!(text.starts_with("ERROR::SHADER::FRAGMENT::COMPILATION_FAILED"));
        assert!(text.ends_with("expected `;`"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn link_error_banner_stands_alone() {
        let err = RenderError::ShaderLink {
            program: "lit".into(),
            log: "entry point `fs_main` not found".into(),
        };
        let text = err.to_string();
        let (banner, body) = text.split_once('\n').unwrap();
        assert_eq!(banner, "ERROR::SHADER::PROGRAM::LINKING_FAILED");
        assert_eq!(body, "lit: entry point `fs_main` not found");
    }

    #[test]
    fn texture_errors_are_recoverable() {
        let err = RenderError::TextureLoad {
            path: PathBuf::from("assets/plane1.jpg"),
            reason: "not found".into(),
        };
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "failed to load texture assets/plane1.jpg: not found"
        );
    }
}
