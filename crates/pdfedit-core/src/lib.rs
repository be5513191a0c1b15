//! pdfedit-core: apply screen-space text edits and annotations to PDF bytes
//!
//! Edits never touch the original content streams. Each replacement is drawn
//! as an overlay: an opaque cover over the old run, then the new text on top.
//! Annotations are overlays too.
//!
//! ```no_run
//! use pdfedit_core::{run_pipeline, Annotations, EditRequest};
//!
//! let original = std::fs::read("contract.pdf").unwrap();
//! let edits: Vec<EditRequest> = serde_json::from_str(
//!     r#"[{"id":"e1","page":1,"x":130,"y":130,"width":260,"height":26,
//!         "originalText":"World","newText":"Hello","fontSize":15.6,"scale":1.3}]"#,
//! )
//! .unwrap();
//! let edited = run_pipeline(&original, &edits, &Annotations::default());
//! std::fs::write("contract-edited.pdf", edited).unwrap();
//! ```

pub mod annotations;
pub mod color;
pub mod compositor;
pub mod config;
pub mod coords;
pub mod edits;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod types;

#[cfg(test)]
mod test_support;

pub use annotations::{apply_annotations, RectRegistry, RectRenderer};
pub use color::Rgb;
pub use compositor::Compositor;
pub use config::PipelineConfig;
pub use edits::apply_edits;
pub use engine::{LopdfEngine, RenderEngine, TextOverlay};
pub use error::{PdfEditError, Result};
pub use pipeline::{run_pipeline, EditPipeline, PipelineOutcome, PipelineStatus};
pub use types::{
    Annotations, DocumentState, EditRequest, ItemOutcome, ItemStatus, PageGeometry, PdfRect,
    RectAnnotation, RectKind, StageOutput, TextAnnotation, TextStyle,
};
