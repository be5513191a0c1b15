use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PdfEditError {
    #[error("Page geometry unavailable: {0}")]
    GeometryUnavailable(String),

    #[error("Overlay render failed: {0}")]
    RenderFailed(String),

    #[error("Composition failed: {0}")]
    CompositionFailed(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Page {page} does not exist (document has {page_count} pages)")]
    InvalidPage { page: u32, page_count: usize },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
}

pub type Result<T> = std::result::Result<T, PdfEditError>;
