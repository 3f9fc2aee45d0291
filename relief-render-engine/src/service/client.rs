use std::sync::{Arc, Mutex};

use bevy::prelude::*;
use thiserror::Error;

use crate::service::status::JobStatus;

/// Failures in the HTTP/decode layer. Surfaced to the host page through the
/// same rejection notifications as server-reported errors; never retried.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("malformed service response: {0}")]
    Malformed(String),
    #[error("image decode failed: {0}")]
    Decode(String),
    #[error("depth estimation service is only reachable from the web build")]
    Unavailable,
}

/// Result of an async service operation, queued by a spawned future and
/// drained on the main schedule.
#[derive(Debug)]
pub enum ServiceOutcome {
    UploadAccepted {
        prediction_id: String,
        image_bytes: Vec<u8>,
        image_mime: Option<String>,
    },
    UploadRejected {
        message: String,
    },
    Status(JobStatus),
    DepthFetched {
        bytes: Vec<u8>,
        mime: Option<String>,
    },
    DepthFetchFailed {
        message: String,
    },
}

/// Thread-safe queue shared with spawned futures.
pub type OutcomeQueue = Arc<Mutex<Vec<ServiceOutcome>>>;

/// Resource bridging async service futures back into the ECS. Futures push
/// outcomes; [`pump_service_outcomes`] republishes them as events once per
/// frame, so service state only ever changes on the main schedule.
#[derive(Resource, Default)]
pub struct ServiceBridge {
    queue: OutcomeQueue,
}

impl ServiceBridge {
    pub fn queue(&self) -> OutcomeQueue {
        self.queue.clone()
    }

    #[cfg(test)]
    pub fn push(&self, outcome: ServiceOutcome) {
        push_outcome(&self.queue, outcome);
    }
}

pub fn push_outcome(queue: &OutcomeQueue, outcome: ServiceOutcome) {
    if let Ok(mut pending) = queue.lock() {
        pending.push(outcome);
    }
}

#[derive(Event)]
pub struct ServiceOutcomeEvent(pub ServiceOutcome);

pub fn pump_service_outcomes(
    bridge: Res<ServiceBridge>,
    mut events: EventWriter<ServiceOutcomeEvent>,
) {
    let outcomes = if let Ok(mut pending) = bridge.queue.lock() {
        std::mem::take(&mut *pending)
    } else {
        Vec::new()
    };

    for outcome in outcomes {
        events.write(ServiceOutcomeEvent(outcome));
    }
}

/// GET a URL and return its bytes plus the response content type.
#[cfg(target_arch = "wasm32")]
pub async fn fetch_binary(url: &str) -> Result<(Vec<u8>, Option<String>), ServiceError> {
    use gloo_net::http::Request;

    let response = Request::get(url)
        .send()
        .await
        .map_err(|err| ServiceError::Transport(err.to_string()))?;
    if !response.ok() {
        return Err(ServiceError::Transport(format!(
            "GET {url} returned {}",
            response.status()
        )));
    }

    let mime = response
        .headers()
        .get("content-type")
        .map(|value| value.split(';').next().unwrap_or_default().trim().to_string());
    let bytes = response
        .binary()
        .await
        .map_err(|err| ServiceError::Transport(err.to_string()))?;
    Ok((bytes, mime))
}
