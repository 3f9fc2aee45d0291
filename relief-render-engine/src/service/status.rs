use std::time::Duration;

use bevy::prelude::*;
use serde::Deserialize;

use crate::engine::core::app_state::ViewerState;
use crate::engine::loading::config_loader::ActiveServiceConfig;
use crate::rpc::web_rpc::WebRpcInterface;
use crate::service::client::{OutcomeQueue, ServiceBridge, ServiceOutcome, ServiceOutcomeEvent};
use crate::service::upload::ReliefJob;

/// Status endpoint payload. Anything that is not a terminal status counts as
/// pending ("starting", "processing", ...).
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub output: Option<StatusOutput>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusOutput {
    #[serde(default)]
    pub grey_depth: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Succeeded { depth_url: String },
    Failed { message: String },
}

impl StatusResponse {
    pub fn classify(self) -> JobStatus {
        match self.status.as_str() {
            "succeeded" => match self.output.and_then(|output| output.grey_depth) {
                Some(depth_url) => JobStatus::Succeeded { depth_url },
                // A terminal status without a depth map cannot keep polling.
                None => JobStatus::Failed {
                    message: "depth map missing from service response".into(),
                },
            },
            "failed" => JobStatus::Failed {
                message: self.error.unwrap_or_else(|| "unknown error".into()),
            },
            _ => JobStatus::Pending,
        }
    }
}

/// Poll scheduling state. A tick only fires a request when the previous one
/// has been drained, so slow responses never stack in-flight requests.
#[derive(Resource)]
pub struct PollTimer {
    timer: Timer,
    pub in_flight: bool,
}

impl PollTimer {
    pub fn new(interval_secs: f32) -> Self {
        Self {
            timer: Timer::from_seconds(interval_secs, TimerMode::Repeating),
            in_flight: false,
        }
    }

    /// Advance by `delta`. Returns true when a status request should be
    /// issued; the in-flight flag is taken immediately and must be cleared
    /// when the response outcome is drained.
    pub fn should_poll(&mut self, delta: Duration) -> bool {
        self.timer.tick(delta);
        if !self.timer.just_finished() || self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }
}

pub fn start_polling(mut commands: Commands, config: Res<ActiveServiceConfig>) {
    commands.insert_resource(PollTimer::new(config.poll_interval_secs));
}

pub fn stop_polling(mut commands: Commands) {
    commands.remove_resource::<PollTimer>();
}

pub fn poll_status_system(
    time: Res<Time>,
    poll: Option<ResMut<PollTimer>>,
    job: Option<Res<ReliefJob>>,
    bridge: Res<ServiceBridge>,
    config: Res<ActiveServiceConfig>,
) {
    let (Some(mut poll), Some(job)) = (poll, job) else {
        return;
    };
    if !poll.should_poll(time.delta()) {
        return;
    }
    spawn_status_poll(
        bridge.queue(),
        format!("{}/{}", config.status_endpoint, job.prediction_id),
    );
}

/// Terminal handling: `succeeded` hides the loading indicator exactly once
/// and hands over to texture fetching; `failed` alerts the host page with
/// the server's error text. Leaving `EstimatingDepth` removes the timer, so
/// no further polls are issued either way.
pub fn apply_status_outcomes(
    mut events: EventReader<ServiceOutcomeEvent>,
    mut commands: Commands,
    mut poll: Option<ResMut<PollTimer>>,
    mut job: Option<ResMut<ReliefJob>>,
    mut rpc: ResMut<WebRpcInterface>,
    mut next_state: ResMut<NextState<ViewerState>>,
) {
    for event in events.read() {
        let ServiceOutcomeEvent(ServiceOutcome::Status(status)) = event else {
            continue;
        };
        if let Some(poll) = poll.as_mut() {
            poll.in_flight = false;
        }

        match status {
            JobStatus::Pending => {}
            JobStatus::Succeeded { depth_url } => {
                info!("Depth estimation succeeded: {depth_url}");
                rpc.send_notification("loading_state", serde_json::json!({ "visible": false }));
                if let Some(job) = job.as_mut() {
                    job.depth_url = Some(depth_url.clone());
                }
                next_state.set(ViewerState::FetchingTextures);
            }
            JobStatus::Failed { message } => {
                warn!("Depth estimation failed: {message}");
                rpc.send_notification(
                    "job_failed",
                    serde_json::json!({ "message": format!("Prediction failed: {message}") }),
                );
                rpc.send_notification("loading_state", serde_json::json!({ "visible": false }));
                commands.remove_resource::<ReliefJob>();
                next_state.set(ViewerState::AwaitingImage);
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
fn spawn_status_poll(queue: OutcomeQueue, status_url: String) {
    use crate::service::client::{ServiceError, push_outcome};
    use gloo_net::http::Request;

    wasm_bindgen_futures::spawn_local(async move {
        let status = async {
            let response = Request::get(&status_url)
                .send()
                .await
                .map_err(|err| ServiceError::Transport(err.to_string()))?;
            let parsed: StatusResponse = response
                .json()
                .await
                .map_err(|err| ServiceError::Malformed(err.to_string()))?;
            Ok::<JobStatus, ServiceError>(parsed.classify())
        }
        .await
        .unwrap_or_else(|err| JobStatus::Failed {
            message: err.to_string(),
        });

        push_outcome(&queue, ServiceOutcome::Status(status));
    });
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn_status_poll(queue: OutcomeQueue, _status_url: String) {
    use crate::service::client::{ServiceError, push_outcome};

    push_outcome(
        &queue,
        ServiceOutcome::Status(JobStatus::Failed {
            message: ServiceError::Unavailable.to_string(),
        }),
    );
}
