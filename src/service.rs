// ============================================================================
// GENERATION SERVICE — external collaborator and result re-entry
// ============================================================================
//
// The remote model is behind `GenerativeService`; this crate only builds the
// request payloads and feeds the returned image back into the viewport.
// Failures are surfaced once and never retried here.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use serde::{Deserialize, Serialize};

use crate::error::{CanvasError, CanvasResult};
use crate::ops::export::ExportPayload;
use crate::source::{EncodedImage, SourceImage};
use crate::viewport::ViewportState;

/// Opaque failure reported by the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceError {
    Timeout,
    /// The service refused the prompt or the image.
    ContentPolicy(String),
    /// Network or HTTP-level failure.
    Transport(String),
    MalformedResponse(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Timeout => write!(f, "the service timed out"),
            ServiceError::ContentPolicy(s) => write!(f, "request rejected: {}", s),
            ServiceError::Transport(s) => write!(f, "transport error: {}", s),
            ServiceError::MalformedResponse(s) => write!(f, "malformed response: {}", s),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Inpainting request: the source with the mask painted on, plus a prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    pub payload: ExportPayload,
    pub prompt: String,
}

/// Outpainting request: the expanded canvas with transparent new area.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpandRequest {
    pub payload: ExportPayload,
}

/// The remote generative-image API.  Implementations block until the
/// service answers.
pub trait GenerativeService: Send + Sync {
    fn submit_edit(&self, request: &EditRequest) -> Result<EncodedImage, ServiceError>;
    fn submit_expand(&self, request: &ExpandRequest) -> Result<EncodedImage, ServiceError>;
}

/// One queued service call.
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceJob {
    Edit(EditRequest),
    Expand(ExpandRequest),
}

impl ServiceJob {
    pub fn run(&self, service: &dyn GenerativeService) -> Result<EncodedImage, ServiceError> {
        match self {
            ServiceJob::Edit(r) => service.submit_edit(r),
            ServiceJob::Expand(r) => service.submit_expand(r),
        }
    }
}

pub fn edit_request(state: &ViewportState, prompt: &str) -> CanvasResult<EditRequest> {
    Ok(EditRequest {
        payload: state.composite_image_with_mask()?,
        prompt: prompt.to_string(),
    })
}

pub fn expand_request(state: &ViewportState) -> CanvasResult<ExpandRequest> {
    Ok(ExpandRequest {
        payload: state.final_expanded_image()?,
    })
}

/// Feed a service response back in as the new source.  The returned state
/// has fresh geometry and an empty mask; on error `state` stays current.
pub fn complete(
    state: &ViewportState,
    response: Result<EncodedImage, ServiceError>,
) -> CanvasResult<ViewportState> {
    let encoded = response.map_err(|e| {
        crate::log_err!("generation service failed: {}", e);
        CanvasError::from(e)
    })?;
    let image = SourceImage::decode(encoded).map_err(|e| {
        crate::log_err!("service returned an unusable image: {}", e);
        CanvasError::UnsupportedOutput
    })?;
    Ok(state.with_replaced(image))
}

/// Composite export → `submit_edit` → re-entry.
pub fn submit_for_edit(
    state: &ViewportState,
    service: &dyn GenerativeService,
    prompt: &str,
) -> CanvasResult<ViewportState> {
    let request = edit_request(state, prompt)?;
    crate::log_info!(
        "submit edit {}×{} ({} bytes)",
        request.payload.width,
        request.payload.height,
        request.payload.image.bytes.len()
    );
    complete(state, service.submit_edit(&request))
}

/// Expanded export → `submit_expand` → re-entry.
pub fn submit_for_expand(
    state: &ViewportState,
    service: &dyn GenerativeService,
) -> CanvasResult<ViewportState> {
    let request = expand_request(state)?;
    crate::log_info!("submit expand {}×{}", request.payload.width, request.payload.height);
    complete(state, service.submit_expand(&request))
}

/// Run `job` on a worker thread.  The caller keeps the canvas interactive
/// and applies the response with [`complete`] when it arrives.
pub fn submit_in_background(
    service: Arc<dyn GenerativeService>,
    job: ServiceJob,
) -> Receiver<Result<EncodedImage, ServiceError>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(job.run(service.as_ref()));
    });
    rx
}
