use std::path::PathBuf;
use thiserror::Error;

/// Failure categories surfaced by the renderer.
///
/// These travel inside `color_eyre::Report`s; callers that need to branch on the
/// category can recover them with `report.downcast_ref::<RenderError>()`.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create {0}")]
    ResourceCreation(String),

    #[error("could not open {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("unsupported image format: {bits_per_pixel} bits per pixel, only 32 is supported")]
    UnsupportedFormat { bits_per_pixel: u8 },

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("error compiling shader {}, check {} for the compiler output", .shader.display(), .diagnostics.display())]
    ShaderCompile {
        shader: PathBuf,
        diagnostics: PathBuf,
    },

    #[error("failed to map {0}")]
    Map(String),

    #[error("missing render input: {0}")]
    MissingInput(&'static str),

    #[error("the {0} is not initialized")]
    NotInitialized(&'static str),

    #[error("the scene is not running")]
    NotRunning,
}

impl RenderError {
    pub fn resource(what: impl Into<String>) -> Self {
        Self::ResourceCreation(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidData(what.into())
    }
}

/// Attaches a [`RenderError::ResourceCreation`] to any native creation result.
pub trait ResourceResultExt<T> {
    fn or_resource(self, what: &str) -> color_eyre::Result<T>;
}

impl<T, E> ResourceResultExt<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn or_resource(self, what: &str) -> color_eyre::Result<T> {
        self.map_err(|e| {
            log::debug!("{} creation failed: {}", what, e);
            color_eyre::eyre::eyre!(e.to_string())
                .wrap_err(RenderError::resource(what))
        })
    }
}
