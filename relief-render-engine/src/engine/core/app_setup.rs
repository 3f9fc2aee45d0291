use bevy::asset::AssetMetaCheck;
use bevy::diagnostic::FrameTimeDiagnosticsPlugin;
use bevy::prelude::*;
use bevy_common_assets::json::JsonAssetPlugin;

// Crate engine modules
use crate::engine::camera::orbit_camera::{
    OrbitCamera, Oscillation, camera_controller, camera_oscillation,
};
use crate::engine::core::app_state::ViewerState;
use crate::engine::core::window_config::create_window_config;
use crate::engine::diagnostics::fps_notification_system;
use crate::engine::loading::config_loader::{
    ActiveServiceConfig, ServiceConfig, ServiceConfigLoader, apply_loaded_config,
    start_config_load,
};
use crate::engine::loading::texture_fetch::{
    apply_depth_outcomes, begin_texture_fetch, finish_texture_loading,
};
use crate::engine::scene::interaction::{
    RenderParameters, ResetCameraEvent, SetDisplacementEvent, SetFovEvent, ToggleAnimationEvent,
    apply_displacement_events, apply_fov_events, apply_reset_events,
    apply_toggle_animation_events,
};
use crate::engine::scene::lighting::spawn_lighting;
use crate::engine::scene::relief_plane::{
    RebuildPlaneEvent, rebuild_relief_plane, watch_window_resize,
};
use crate::engine::shaders::DepthReliefMaterial;
// Service and RPC modules
use crate::rpc::web_rpc::WebRpcPlugin;
use crate::service::client::{ServiceBridge, ServiceOutcomeEvent, pump_service_outcomes};
use crate::service::status::{
    apply_status_outcomes, poll_status_system, start_polling, stop_polling,
};
use crate::service::upload::{SubmitImageEvent, apply_upload_outcomes, handle_submit_events};

use constants::render_settings::{BASE_CAMERA_DISTANCE, BASE_FOV_DEGREES, CAMERA_FAR, CAMERA_NEAR};

#[cfg(not(target_arch = "wasm32"))]
use crate::engine::diagnostics::fps_text_update_system;

pub fn create_app() -> App {
    let mut app = App::new();

    app.add_plugins(create_default_plugins())
        .add_plugins(MaterialPlugin::<DepthReliefMaterial>::default())
        .add_plugins(FrameTimeDiagnosticsPlugin::default())
        // Registers ServiceConfig as a loadable asset type from JSON files.
        .add_plugins(JsonAssetPlugin::<ServiceConfig>::new(&["json"]))
        .add_plugins(WebRpcPlugin)
        .init_state::<ViewerState>();

    // Page-lifetime resources; scene entities are job-lifetime.
    app.init_resource::<ServiceBridge>()
        .init_resource::<ServiceConfigLoader>()
        .init_resource::<ActiveServiceConfig>()
        .init_resource::<RenderParameters>()
        .init_resource::<OrbitCamera>()
        .init_resource::<Oscillation>()
        .add_event::<SubmitImageEvent>()
        .add_event::<ServiceOutcomeEvent>()
        .add_event::<SetDisplacementEvent>()
        .add_event::<SetFovEvent>()
        .add_event::<ResetCameraEvent>()
        .add_event::<ToggleAnimationEvent>()
        .add_event::<RebuildPlaneEvent>();

    app.add_systems(Startup, (setup, start_config_load));

    // Service pipeline: async outcomes re-enter the ECS first, then each
    // lifecycle stage consumes the ones it cares about.
    app.add_systems(
        Update,
        (
            apply_loaded_config,
            pump_service_outcomes,
            (handle_submit_events, apply_upload_outcomes)
                .run_if(in_state(ViewerState::AwaitingImage)),
            (poll_status_system, apply_status_outcomes)
                .run_if(in_state(ViewerState::EstimatingDepth)),
            (apply_depth_outcomes, finish_texture_loading)
                .run_if(in_state(ViewerState::FetchingTextures)),
        )
            .chain(),
    );

    app.add_systems(OnEnter(ViewerState::EstimatingDepth), start_polling)
        .add_systems(OnExit(ViewerState::EstimatingDepth), stop_polling)
        .add_systems(
            OnEnter(ViewerState::FetchingTextures),
            (spawn_scene, begin_texture_fetch).chain(),
        );

    // Interactive systems only run once the scene is live.
    app.add_systems(
        Update,
        (
            (camera_controller, camera_oscillation).chain(),
            apply_displacement_events,
            apply_fov_events,
            apply_reset_events,
            apply_toggle_animation_events,
            watch_window_resize,
            fps_notification_system,
        )
            .run_if(in_state(ViewerState::Running)),
    );

    // Rebuilds may be requested from any state; the system bails until the
    // textures exist.
    app.add_systems(Update, rebuild_relief_plane);

    #[cfg(not(target_arch = "wasm32"))]
    {
        app.add_systems(Update, fps_text_update_system);
    }

    app
}

fn create_default_plugins() -> impl PluginGroup {
    let window_config = WindowPlugin {
        primary_window: Some(create_window_config()),
        ..default()
    };

    let asset_config = AssetPlugin {
        meta_check: AssetMetaCheck::Never,
        ..default()
    };

    DefaultPlugins.set(window_config).set(asset_config)
}

// Startup only prepares diagnostics; the scene itself waits for a job.
fn setup(mut commands: Commands) {
    info!("Depth relief viewer starting");

    #[cfg(not(target_arch = "wasm32"))]
    crate::engine::diagnostics::spawn_fps_overlay(&mut commands);

    #[cfg(target_arch = "wasm32")]
    let _ = &mut commands;
}

/// Build the 3D scene for a completed job: perspective camera at the base
/// pose plus lighting. The camera survives later jobs; only the plane and
/// textures are replaced.
fn spawn_scene(mut commands: Commands, existing_cameras: Query<(), With<Camera3d>>) {
    if !existing_cameras.is_empty() {
        return;
    }
    info!("Building scene for completed depth job");

    spawn_lighting(&mut commands);

    commands.spawn((
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: BASE_FOV_DEGREES.to_radians(),
            near: CAMERA_NEAR,
            far: CAMERA_FAR,
            ..default()
        }),
        Transform::from_xyz(0.0, 0.0, BASE_CAMERA_DISTANCE).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}
