use bevy::prelude::*;
use serde::Deserialize;

use crate::engine::core::app_state::ViewerState;
use crate::rpc::web_rpc::WebRpcInterface;
use crate::service::client::{OutcomeQueue, ServiceBridge, ServiceOutcome, ServiceOutcomeEvent};
use crate::engine::loading::config_loader::ActiveServiceConfig;

/// The active depth-estimation job. Created when the upload is accepted,
/// removed when the job fails; the source image bytes ride along so the
/// object URL is read exactly once.
#[derive(Resource)]
pub struct ReliefJob {
    pub prediction_id: String,
    pub image_bytes: Vec<u8>,
    pub image_mime: Option<String>,
    pub depth_url: Option<String>,
}

/// Host page submitted the upload form with an object URL for the file.
#[derive(Event)]
pub struct SubmitImageEvent {
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub prediction_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectionBody {
    #[serde(default)]
    pub error: Option<String>,
}

impl RejectionBody {
    pub fn message(&self) -> String {
        format!(
            "Error: {}",
            self.error.as_deref().unwrap_or("upload failed")
        )
    }
}

/// Show the loading indicator and start the upload. One request per
/// submission; there are no retries.
pub fn handle_submit_events(
    mut events: EventReader<SubmitImageEvent>,
    bridge: Res<ServiceBridge>,
    config: Res<ActiveServiceConfig>,
    mut rpc: ResMut<WebRpcInterface>,
) {
    for event in events.read() {
        info!("Submitting image for depth estimation");
        rpc.send_notification("loading_state", serde_json::json!({ "visible": true }));
        spawn_upload(
            bridge.queue(),
            config.upload_endpoint.clone(),
            event.image_url.clone(),
        );
    }
}

pub fn apply_upload_outcomes(
    mut events: EventReader<ServiceOutcomeEvent>,
    mut commands: Commands,
    mut rpc: ResMut<WebRpcInterface>,
    mut next_state: ResMut<NextState<ViewerState>>,
) {
    for event in events.read() {
        match &event.0 {
            ServiceOutcome::UploadAccepted {
                prediction_id,
                image_bytes,
                image_mime,
            } => {
                info!("Upload accepted, prediction id {prediction_id}");
                commands.insert_resource(ReliefJob {
                    prediction_id: prediction_id.clone(),
                    image_bytes: image_bytes.clone(),
                    image_mime: image_mime.clone(),
                    depth_url: None,
                });
                next_state.set(ViewerState::EstimatingDepth);
            }
            ServiceOutcome::UploadRejected { message } => {
                warn!("Upload rejected: {message}");
                rpc.send_notification("upload_rejected", serde_json::json!({ "message": message }));
                rpc.send_notification("loading_state", serde_json::json!({ "visible": false }));
            }
            _ => {}
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn spawn_upload(queue: OutcomeQueue, upload_endpoint: String, image_url: String) {
    use crate::service::client::push_outcome;

    wasm_bindgen_futures::spawn_local(async move {
        let outcome = run_upload(&upload_endpoint, &image_url)
            .await
            .unwrap_or_else(|err| ServiceOutcome::UploadRejected {
                message: format!("Error: {err}"),
            });
        push_outcome(&queue, outcome);
    });
}

#[cfg(target_arch = "wasm32")]
async fn run_upload(
    upload_endpoint: &str,
    image_url: &str,
) -> Result<ServiceOutcome, crate::service::client::ServiceError> {
    use crate::service::client::{ServiceError, fetch_binary};
    use constants::service::UPLOAD_FIELD_NAME;
    use gloo_net::http::Request;

    let (image_bytes, image_mime) = fetch_binary(image_url).await?;

    let array = js_sys::Uint8Array::from(image_bytes.as_slice());
    let parts = js_sys::Array::of1(&array);
    let blob = web_sys::Blob::new_with_u8_array_sequence(&parts)
        .map_err(|_| ServiceError::Transport("failed to assemble upload blob".into()))?;
    let form = web_sys::FormData::new()
        .map_err(|_| ServiceError::Transport("failed to build form data".into()))?;
    form.append_with_blob_and_filename(UPLOAD_FIELD_NAME, &blob, "image")
        .map_err(|_| ServiceError::Transport("failed to attach image to form".into()))?;

    let response = Request::post(upload_endpoint)
        .body(form)
        .map_err(|err| ServiceError::Transport(err.to_string()))?
        .send()
        .await
        .map_err(|err| ServiceError::Transport(err.to_string()))?;

    if response.ok() {
        let accepted: UploadResponse = response
            .json()
            .await
            .map_err(|err| ServiceError::Malformed(err.to_string()))?;
        Ok(ServiceOutcome::UploadAccepted {
            prediction_id: accepted.prediction_id,
            image_bytes,
            image_mime,
        })
    } else {
        let rejection: RejectionBody = response.json().await.unwrap_or_default();
        Ok(ServiceOutcome::UploadRejected {
            message: rejection.message(),
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn_upload(queue: OutcomeQueue, _upload_endpoint: String, _image_url: String) {
    use crate::service::client::{ServiceError, push_outcome};

    push_outcome(
        &queue,
        ServiceOutcome::UploadRejected {
            message: format!("Error: {}", ServiceError::Unavailable),
        },
    );
}
