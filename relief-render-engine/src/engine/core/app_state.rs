use bevy::prelude::*;

/// Lifecycle of a page view. One depth-estimation job is active at a time;
/// failure paths return to `AwaitingImage` so the user can submit again.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Hash, States)]
pub enum ViewerState {
    /// No job yet, or the previous job terminated in failure.
    #[default]
    AwaitingImage,
    /// Upload accepted; the status endpoint is being polled.
    EstimatingDepth,
    /// Depth map ready; photo and depth textures are being decoded.
    FetchingTextures,
    /// Scene built, render loop and controls live.
    Running,
}
