use bevy::asset::RenderAssetUsages;
use bevy::image::{CompressedImageFormats, ImageSampler, ImageType};
use bevy::prelude::*;

use crate::engine::core::app_state::ViewerState;
use crate::engine::loading::progress::LoadingProgress;
use crate::engine::scene::relief_plane::{RebuildPlaneEvent, ReliefTextures};
use crate::rpc::web_rpc::WebRpcInterface;
use crate::service::client::{
    OutcomeQueue, ServiceBridge, ServiceError, ServiceOutcome, ServiceOutcomeEvent,
};
use crate::service::upload::ReliefJob;

/// Decode fetched bytes into a texture. The photo is sRGB; the depth map is
/// sampled as data and stays linear.
pub fn decode_image(
    bytes: &[u8],
    mime: Option<&str>,
    is_srgb: bool,
) -> Result<Image, ServiceError> {
    let image_type = match mime {
        Some(mime) if mime.starts_with("image/") => ImageType::MimeType(mime),
        _ => ImageType::Extension("png"),
    };
    Image::from_buffer(
        bytes,
        image_type,
        CompressedImageFormats::NONE,
        is_srgb,
        ImageSampler::linear(),
        RenderAssetUsages::RENDER_WORLD,
    )
    .map_err(|err| ServiceError::Decode(err.to_string()))
}

fn fail_job(
    commands: &mut Commands,
    rpc: &mut WebRpcInterface,
    next_state: &mut NextState<ViewerState>,
    message: String,
) {
    warn!("Abandoning job: {message}");
    rpc.send_notification(
        "job_failed",
        serde_json::json!({ "message": format!("Prediction failed: {message}") }),
    );
    rpc.send_notification("loading_state", serde_json::json!({ "visible": false }));
    commands.remove_resource::<ReliefJob>();
    commands.remove_resource::<LoadingProgress>();
    next_state.set(ViewerState::AwaitingImage);
}

/// Decode the retained source image and start fetching the depth map.
pub fn begin_texture_fetch(
    mut commands: Commands,
    job: Option<Res<ReliefJob>>,
    bridge: Res<ServiceBridge>,
    mut images: ResMut<Assets<Image>>,
    mut rpc: ResMut<WebRpcInterface>,
    mut next_state: ResMut<NextState<ViewerState>>,
) {
    let Some(job) = job else {
        return;
    };

    let mut progress = LoadingProgress::default();
    match decode_image(&job.image_bytes, job.image_mime.as_deref(), true) {
        Ok(image) => {
            progress.image_aspect = image.width() as f32 / image.height() as f32;
            progress.color_texture = Some(images.add(image));
        }
        Err(err) => {
            fail_job(&mut commands, &mut rpc, &mut next_state, err.to_string());
            return;
        }
    }

    let Some(depth_url) = job.depth_url.clone() else {
        fail_job(
            &mut commands,
            &mut rpc,
            &mut next_state,
            "depth map missing from service response".into(),
        );
        return;
    };

    spawn_depth_fetch(bridge.queue(), depth_url);
    commands.insert_resource(progress);
}

pub fn apply_depth_outcomes(
    mut events: EventReader<ServiceOutcomeEvent>,
    mut commands: Commands,
    mut images: ResMut<Assets<Image>>,
    mut progress: Option<ResMut<LoadingProgress>>,
    mut rpc: ResMut<WebRpcInterface>,
    mut next_state: ResMut<NextState<ViewerState>>,
) {
    for event in events.read() {
        match &event.0 {
            ServiceOutcome::DepthFetched { bytes, mime } => {
                match decode_image(bytes, mime.as_deref(), false) {
                    Ok(image) => {
                        if let Some(progress) = progress.as_mut() {
                            progress.depth_texture = Some(images.add(image));
                        }
                    }
                    Err(err) => {
                        fail_job(&mut commands, &mut rpc, &mut next_state, err.to_string());
                    }
                }
            }
            ServiceOutcome::DepthFetchFailed { message } => {
                fail_job(&mut commands, &mut rpc, &mut next_state, message.clone());
            }
            _ => {}
        }
    }
}

/// Once both textures are decoded, publish them and request the first plane
/// build at the photo's aspect ratio.
pub fn finish_texture_loading(
    mut commands: Commands,
    progress: Option<Res<LoadingProgress>>,
    mut rebuild: EventWriter<RebuildPlaneEvent>,
    mut next_state: ResMut<NextState<ViewerState>>,
) {
    let Some(progress) = progress else {
        return;
    };
    if !progress.ready() {
        return;
    }
    let (Some(color), Some(depth)) = (
        progress.color_texture.clone(),
        progress.depth_texture.clone(),
    ) else {
        return;
    };

    let aspect = progress.image_aspect;
    info!("Relief textures ready (aspect {aspect:.3})");
    commands.insert_resource(ReliefTextures {
        color,
        depth,
        image_aspect: aspect,
    });
    commands.remove_resource::<LoadingProgress>();
    rebuild.write(RebuildPlaneEvent { aspect });
    next_state.set(ViewerState::Running);
}

#[cfg(target_arch = "wasm32")]
fn spawn_depth_fetch(queue: OutcomeQueue, depth_url: String) {
    use crate::service::client::{fetch_binary, push_outcome};

    wasm_bindgen_futures::spawn_local(async move {
        let outcome = match fetch_binary(&depth_url).await {
            Ok((bytes, mime)) => ServiceOutcome::DepthFetched { bytes, mime },
            Err(err) => ServiceOutcome::DepthFetchFailed {
                message: err.to_string(),
            },
        };
        push_outcome(&queue, outcome);
    });
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn_depth_fetch(queue: OutcomeQueue, _depth_url: String) {
    use crate::service::client::push_outcome;

    push_outcome(
        &queue,
        ServiceOutcome::DepthFetchFailed {
            message: ServiceError::Unavailable.to_string(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::state::app::StatesPlugin;

    #[test]
    fn finish_waits_for_both_textures() {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, StatesPlugin))
            .insert_state(ViewerState::FetchingTextures)
            .add_event::<RebuildPlaneEvent>()
            .add_systems(Update, finish_texture_loading);

        app.insert_resource(LoadingProgress {
            color_texture: Some(Handle::default()),
            depth_texture: None,
            image_aspect: 1.5,
        });
        app.update();
        assert!(app.world().get_resource::<ReliefTextures>().is_none());
        assert_eq!(
            *app.world().resource::<State<ViewerState>>().get(),
            ViewerState::FetchingTextures
        );

        app.world_mut()
            .resource_mut::<LoadingProgress>()
            .depth_texture = Some(Handle::default());
        app.update();
        app.update();

        let textures = app
            .world()
            .get_resource::<ReliefTextures>()
            .expect("textures published");
        assert!((textures.image_aspect - 1.5).abs() < 1e-6);
        assert!(app.world().get_resource::<LoadingProgress>().is_none());
        assert_eq!(
            *app.world().resource::<State<ViewerState>>().get(),
            ViewerState::Running
        );

        let rebuilds = app.world().resource::<Events<RebuildPlaneEvent>>();
        assert!(!rebuilds.is_empty(), "first plane build requested");
    }
}
