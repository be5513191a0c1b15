//! API handlers for the pdfedit server

use std::time::Duration;

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
    Json,
};
use pdfedit_core::{Annotations, EditRequest};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::AppState;

pub const PIPELINE_STATUS_HEADER: &str = "x-pipeline-status";

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdfedit-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Parsed `apply-edits` form.
#[derive(Debug, Default)]
pub struct EditForm {
    pub file: Vec<u8>,
    pub filename: String,
    pub edits: Vec<EditRequest>,
    pub annotations: Annotations,
}

impl EditForm {
    pub async fn read(multipart: &mut Multipart) -> Result<Self, ServerError> {
        let mut form = EditForm::default();
        let mut file = None;

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "file" => {
                    form.filename = field.file_name().unwrap_or("").to_string();
                    file = Some(field.bytes().await?.to_vec());
                }
                "textEdits" => form.edits = json_field(field, &name).await?,
                "textAnnotations" => form.annotations.texts = json_field(field, &name).await?,
                "rectAnnotations" => form.annotations.rects = json_field(field, &name).await?,
                _ => debug!("Ignoring form field '{}'", name),
            }
        }

        form.file = file.ok_or(ServerError::MissingFile)?;
        Ok(form)
    }
}

/// Decode a JSON array field; an empty field is an empty list.
async fn json_field<T: DeserializeOwned>(
    field: Field<'_>,
    name: &str,
) -> Result<Vec<T>, ServerError> {
    let text = field.text().await?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&text)
        .map_err(|e| ServerError::InvalidRequest(format!("invalid {} JSON: {}", name, e)))
}

/// Download name for the edited document: `report.pdf` becomes
/// `report-edited.pdf`, and an unnamed upload becomes `edited.pdf`.
pub fn edited_filename(original: &str) -> String {
    let safe: String = original
        .trim()
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = match safe.len().checked_sub(4) {
        Some(cut) if safe[cut..].eq_ignore_ascii_case(".pdf") => &safe[..cut],
        _ => safe.as_str(),
    };
    if stem.is_empty() {
        "edited.pdf".to_string()
    } else {
        format!("{}-edited.pdf", stem)
    }
}

/// Handler: POST /api/pdf/apply-edits
pub async fn handle_apply_edits(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ServerError> {
    let EditForm {
        file,
        filename,
        edits,
        annotations,
    } = EditForm::read(&mut multipart).await?;

    info!(
        "Received {} rects, {} texts, {} edits for '{}' ({} bytes)",
        annotations.rects.len(),
        annotations.texts.len(),
        edits.len(),
        filename,
        file.len()
    );

    let pipeline = state.pipeline.clone();
    let task = tokio::task::spawn_blocking(move || pipeline.run(&file, &edits, &annotations));
    let outcome = tokio::time::timeout(Duration::from_millis(state.timeout_ms), task)
        .await
        .map_err(|_| {
            warn!("Edit of '{}' exceeded {}ms", filename, state.timeout_ms);
            ServerError::Timeout(state.timeout_ms)
        })?
        .map_err(|e| ServerError::Internal(format!("edit worker failed: {}", e)))?;

    if outcome.is_degraded() {
        let failed = outcome
            .edits
            .iter()
            .chain(&outcome.annotations)
            .filter(|o| !o.is_applied());
        for item in failed {
            debug!("Item not fully applied: {:?}", item);
        }
    }
    info!(
        "Returning {} bytes for '{}' ({})",
        outcome.document.len(),
        filename,
        outcome.status.as_str()
    );

    let disposition = format!("attachment; filename=\"{}\"", edited_filename(&filename));
    Ok((
        [
            (CONTENT_TYPE, "application/pdf".to_string()),
            (CONTENT_DISPOSITION, disposition),
            (
                HeaderName::from_static(PIPELINE_STATUS_HEADER),
                outcome.status.as_str().to_string(),
            ),
        ],
        outcome.document,
    )
        .into_response())
}
