use std::path::{Path, PathBuf};
use thiserror::Error;

/// pce-oci error types
#[derive(Error, Debug)]
pub enum ImageError {
    /// Missing or invalid image layout, index file, or layout version
    #[error("Layout error: {0}")]
    LayoutError(String),

    /// No manifest descriptor could be selected from the index
    #[error("Manifest selection error: {0}")]
    ManifestSelectionError(String),

    /// A manifest, config, index or layer media type is not recognized
    #[error("Unsupported {kind} media type {media_type:?}")]
    UnsupportedMediaType { kind: String, media_type: String },

    /// The filtered layer set for an engine is empty
    #[error("No {kind} layers found in image")]
    NoLayers { kind: String },

    /// External process failed to start, exited non-zero, or its output could not be read
    #[error("Tool invocation failed: {tool} - {message}")]
    ToolInvocation { tool: String, message: String },

    /// Directory creation, listing or removal failure
    #[error("Filesystem error at {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure while processing one layer of a chain
    #[error("Layer {digest}: {stage}: {source}")]
    Layer {
        digest: String,
        stage: String,
        #[source]
        source: Box<ImageError>,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ImageError {
    /// Build a [`ImageError::Filesystem`] for `path`.
    pub fn fs(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ImageError::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build a [`ImageError::ToolInvocation`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        ImageError::ToolInvocation {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Wrap this error with the layer digest and the step that failed.
    pub fn in_layer(self, digest: impl Into<String>, stage: impl Into<String>) -> Self {
        ImageError::Layer {
            digest: digest.into(),
            stage: stage.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for ImageError {
    fn from(err: serde_json::Error) -> Self {
        ImageError::SerializationError(err.to_string())
    }
}

/// Result type alias for pce-oci operations
pub type Result<T> = std::result::Result<T, ImageError>;
