use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::core::app_state::ViewerState;
use crate::engine::scene::interaction::{
    ResetCameraEvent, SetDisplacementEvent, SetFovEvent, ToggleAnimationEvent,
};
use crate::service::upload::SubmitImageEvent;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
use web_sys::{MessageEvent, window};

/// JSON-RPC 2.0 request structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<RpcError>,
    pub id: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 notification structure for one-way communication.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

/// JSON-RPC error structure following specification.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl RpcError {
    pub fn invalid_params(message: &str) -> Self {
        Self {
            code: -32602,
            message: message.to_string(),
            data: None,
        }
    }

    pub fn internal_error(message: &str) -> Self {
        Self {
            code: -32603,
            message: message.to_string(),
            data: None,
        }
    }
}

/// Resource managing bidirectional RPC communication with the host page.
/// Handles both request-response pairs and notification broadcasting
/// (loading indicator, failure alerts, FPS).
#[derive(Resource, Default)]
pub struct WebRpcInterface {
    pub(crate) outgoing_notifications: Vec<RpcNotification>,
    pub(crate) outgoing_responses: Vec<RpcResponse>,
}

impl WebRpcInterface {
    /// Send notification to the host page without expecting a response.
    pub fn send_notification(&mut self, method: &str, params: serde_json::Value) {
        self.outgoing_notifications.push(RpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        });
    }

    fn queue_response(&mut self, response: RpcResponse) {
        self.outgoing_responses.push(response);
    }
}

/// Plugin establishing the postMessage RPC layer between the host page and
/// the engine.
pub struct WebRpcPlugin;

impl Plugin for WebRpcPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<WebRpcInterface>()
            .add_event::<IncomingRpcMessage>()
            .add_systems(
                Update,
                (
                    process_incoming_messages,
                    handle_rpc_messages,
                    send_outgoing_messages,
                )
                    .chain(),
            );

        #[cfg(target_arch = "wasm32")]
        app.add_systems(Startup, setup_message_listener);
    }
}

#[cfg(target_arch = "wasm32")]
fn setup_message_listener(mut commands: Commands) {
    use std::sync::Arc;
    use std::sync::Mutex;

    let message_queue: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let queue_clone = message_queue.clone();

    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        if let Ok(data) = event.data().dyn_into::<js_sys::JsString>() {
            let message_str: String = data.into();

            // Cheap shape check before queueing; full parsing happens on the
            // main schedule.
            if message_str.contains("jsonrpc") {
                if let Ok(mut queue) = queue_clone.lock() {
                    queue.push(message_str);
                }
            }
        }
    }) as Box<dyn FnMut(MessageEvent)>);

    if let Some(window) = window() {
        window
            .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
            .expect("Failed to register message listener");
    }

    // Ownership moves to the JS side for the page's lifetime.
    closure.forget();
    commands.insert_resource(MessageQueue(message_queue));
}

/// Resource wrapping the thread-safe message queue for WASM event handling.
#[derive(Resource)]
struct MessageQueue(std::sync::Arc<std::sync::Mutex<Vec<String>>>);

/// Incoming RPC message from the host page.
#[derive(Event)]
pub struct IncomingRpcMessage {
    pub content: String,
}

fn process_incoming_messages(
    message_queue: Option<Res<MessageQueue>>,
    mut message_events: EventWriter<IncomingRpcMessage>,
) {
    let Some(queue_res) = message_queue else {
        return;
    };

    let messages = if let Ok(mut queue) = queue_res.0.lock() {
        std::mem::take(&mut *queue)
    } else {
        Vec::new()
    };

    for message_str in messages {
        message_events.write(IncomingRpcMessage {
            content: message_str,
        });
    }
}

pub fn handle_rpc_messages(
    mut events: EventReader<IncomingRpcMessage>,
    diagnostics: Res<DiagnosticsStore>,
    state: Res<State<ViewerState>>,
    mut rpc_interface: ResMut<WebRpcInterface>,
    mut submit_events: EventWriter<SubmitImageEvent>,
    mut displacement_events: EventWriter<SetDisplacementEvent>,
    mut fov_events: EventWriter<SetFovEvent>,
    mut reset_events: EventWriter<ResetCameraEvent>,
    mut animation_events: EventWriter<ToggleAnimationEvent>,
) {
    for event in events.read() {
        match serde_json::from_str::<RpcRequest>(&event.content) {
            Ok(request) => {
                let response = handle_rpc_request(
                    &request,
                    &diagnostics,
                    *state.get(),
                    &mut submit_events,
                    &mut displacement_events,
                    &mut fov_events,
                    &mut reset_events,
                    &mut animation_events,
                );
                if let Some(response) = response {
                    rpc_interface.queue_response(response);
                }
            }
            Err(parse_error) => {
                warn!("Discarding malformed RPC message: {parse_error}");
            }
        }
    }
}

/// Handle an individual RPC request. The method runs either way; only
/// requests carrying an id get a response back.
#[allow(clippy::too_many_arguments)]
fn handle_rpc_request(
    request: &RpcRequest,
    diagnostics: &DiagnosticsStore,
    state: ViewerState,
    submit_events: &mut EventWriter<SubmitImageEvent>,
    displacement_events: &mut EventWriter<SetDisplacementEvent>,
    fov_events: &mut EventWriter<SetFovEvent>,
    reset_events: &mut EventWriter<ResetCameraEvent>,
    animation_events: &mut EventWriter<ToggleAnimationEvent>,
) -> Option<RpcResponse> {
    let result = match request.method.as_str() {
        "submit_image" => handle_submit_image(&request.params, state, submit_events),
        "set_displacement" => handle_set_displacement(&request.params, displacement_events),
        "set_fov" => handle_set_fov(&request.params, fov_events),
        "reset_camera" => {
            reset_events.write(ResetCameraEvent);
            Ok(serde_json::json!({ "success": true }))
        }
        "toggle_animation" => {
            animation_events.write(ToggleAnimationEvent);
            Ok(serde_json::json!({ "success": true }))
        }
        "get_fps" => handle_get_fps(diagnostics),
        _ => {
            warn!("Unknown RPC method: {}", request.method);
            Err(RpcError {
                code: -32601,
                message: "Method not found".to_string(),
                data: Some(serde_json::json!({ "method": request.method })),
            })
        }
    };

    let id = request.id.clone()?;
    match result {
        Ok(result_value) => Some(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(result_value),
            error: None,
            id: Some(id),
        }),
        Err(error) => Some(RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id: Some(id),
        }),
    }
}

fn handle_submit_image(
    params: &serde_json::Value,
    state: ViewerState,
    submit_events: &mut EventWriter<SubmitImageEvent>,
) -> Result<serde_json::Value, RpcError> {
    #[derive(Deserialize)]
    struct SubmitImageParams {
        image_url: String,
    }

    if state != ViewerState::AwaitingImage {
        return Err(RpcError::internal_error(
            "a depth estimation job is already active",
        ));
    }

    let params = serde_json::from_value::<SubmitImageParams>(params.clone())
        .map_err(|_| RpcError::invalid_params("Expected 'image_url' parameter"))?;

    submit_events.write(SubmitImageEvent {
        image_url: params.image_url,
    });

    Ok(serde_json::json!({ "success": true }))
}

fn handle_set_displacement(
    params: &serde_json::Value,
    displacement_events: &mut EventWriter<SetDisplacementEvent>,
) -> Result<serde_json::Value, RpcError> {
    #[derive(Deserialize)]
    struct DisplacementParams {
        value: f32,
    }

    let params = serde_json::from_value::<DisplacementParams>(params.clone())
        .map_err(|_| RpcError::invalid_params("Expected numeric 'value' parameter"))?;

    displacement_events.write(SetDisplacementEvent {
        value: params.value,
    });

    // Two-decimal echo for the page's readout label.
    Ok(serde_json::json!({ "displacement": format!("{:.2}", params.value) }))
}

fn handle_set_fov(
    params: &serde_json::Value,
    fov_events: &mut EventWriter<SetFovEvent>,
) -> Result<serde_json::Value, RpcError> {
    #[derive(Deserialize)]
    struct FovParams {
        degrees: f32,
    }

    let params = serde_json::from_value::<FovParams>(params.clone())
        .map_err(|_| RpcError::invalid_params("Expected numeric 'degrees' parameter"))?;

    let degrees = params.degrees.clamp(1.0, 179.0);
    fov_events.write(SetFovEvent { degrees });

    Ok(serde_json::json!({ "fov": format!("{degrees:.0}") }))
}

fn handle_get_fps(diagnostics: &DiagnosticsStore) -> Result<serde_json::Value, RpcError> {
    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|fps_diagnostic| fps_diagnostic.smoothed())
        .unwrap_or(0.0) as f32;

    Ok(serde_json::json!({ "fps": fps }))
}

/// Send queued notifications and responses to the host page.
fn send_outgoing_messages(mut rpc_interface: ResMut<WebRpcInterface>) {
    for notification in rpc_interface.outgoing_notifications.drain(..) {
        send_message_to_parent(&notification);
    }

    // Responses second to maintain order.
    for response in rpc_interface.outgoing_responses.drain(..) {
        send_message_to_parent(&response);
    }
}

/// Serialize a message and post it to the parent window.
fn send_message_to_parent<T: Serialize>(message: &T) {
    #[cfg(target_arch = "wasm32")]
    {
        match serde_json::to_string(message) {
            Ok(json) => {
                if let Some(window) = window() {
                    if let Some(parent) = window.parent().ok().flatten() {
                        if let Err(e) = parent.post_message(&JsValue::from_str(&json), "*") {
                            error!("Failed to send message to parent: {:?}", e);
                        }
                    } else {
                        warn!("No parent window available for message transmission");
                    }
                } else {
                    error!("Window object not available");
                }
            }
            Err(e) => {
                error!("Failed to serialize message: {}", e);
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = message;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::diagnostic::DiagnosticsPlugin;
    use bevy::state::app::StatesPlugin;

    fn rpc_test_app(state: ViewerState) -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, StatesPlugin, DiagnosticsPlugin))
            .insert_state(state)
            .init_resource::<WebRpcInterface>()
            .add_event::<IncomingRpcMessage>()
            .add_event::<SubmitImageEvent>()
            .add_event::<SetDisplacementEvent>()
            .add_event::<SetFovEvent>()
            .add_event::<ResetCameraEvent>()
            .add_event::<ToggleAnimationEvent>()
            .add_systems(Update, handle_rpc_messages);
        app
    }

    fn send_rpc(app: &mut App, message: &str) {
        app.world_mut().send_event(IncomingRpcMessage {
            content: message.to_string(),
        });
        app.update();
    }

    #[test]
    fn submit_image_dispatches_event_and_responds() {
        let mut app = rpc_test_app(ViewerState::AwaitingImage);
        send_rpc(
            &mut app,
            r#"{"jsonrpc": "2.0", "method": "submit_image", "params": {"image_url": "blob:abc"}, "id": 1}"#,
        );

        assert_eq!(
            app.world().resource::<Events<SubmitImageEvent>>().len(),
            1
        );
        let rpc = app.world().resource::<WebRpcInterface>();
        assert_eq!(rpc.outgoing_responses.len(), 1);
        assert!(rpc.outgoing_responses[0].error.is_none());
    }

    #[test]
    fn submit_image_rejected_while_job_active() {
        let mut app = rpc_test_app(ViewerState::EstimatingDepth);
        send_rpc(
            &mut app,
            r#"{"jsonrpc": "2.0", "method": "submit_image", "params": {"image_url": "blob:abc"}, "id": 2}"#,
        );

        assert!(app.world().resource::<Events<SubmitImageEvent>>().is_empty());
        let rpc = app.world().resource::<WebRpcInterface>();
        let error = rpc.outgoing_responses[0].error.as_ref().expect("error");
        assert_eq!(error.code, -32603);
    }

    #[test]
    fn displacement_echo_has_two_decimals() {
        let mut app = rpc_test_app(ViewerState::Running);
        send_rpc(
            &mut app,
            r#"{"jsonrpc": "2.0", "method": "set_displacement", "params": {"value": 0.5}, "id": 3}"#,
        );

        let rpc = app.world().resource::<WebRpcInterface>();
        let result = rpc.outgoing_responses[0].result.as_ref().unwrap();
        assert_eq!(result["displacement"], serde_json::json!("0.50"));
        assert_eq!(
            app.world()
                .resource::<Events<SetDisplacementEvent>>()
                .len(),
            1
        );
    }

    #[test]
    fn unknown_method_yields_method_not_found() {
        let mut app = rpc_test_app(ViewerState::Running);
        send_rpc(
            &mut app,
            r#"{"jsonrpc": "2.0", "method": "frobnicate", "id": 4}"#,
        );

        let rpc = app.world().resource::<WebRpcInterface>();
        let error = rpc.outgoing_responses[0].error.as_ref().expect("error");
        assert_eq!(error.code, -32601);
    }

    #[test]
    fn notifications_without_id_get_no_response() {
        let mut app = rpc_test_app(ViewerState::Running);
        send_rpc(
            &mut app,
            r#"{"jsonrpc": "2.0", "method": "toggle_animation"}"#,
        );

        assert_eq!(
            app.world()
                .resource::<Events<ToggleAnimationEvent>>()
                .len(),
            1
        );
        let rpc = app.world().resource::<WebRpcInterface>();
        assert!(rpc.outgoing_responses.is_empty());
    }
}
