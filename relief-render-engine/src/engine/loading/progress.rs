use bevy::prelude::*;

/// Texture readiness between depth completion and the first plane build.
/// Lives only while the viewer is in the texture-fetch state.
#[derive(Resource, Default)]
pub struct LoadingProgress {
    pub color_texture: Option<Handle<Image>>,
    pub depth_texture: Option<Handle<Image>>,
    pub image_aspect: f32,
}

impl LoadingProgress {
    pub fn ready(&self) -> bool {
        self.color_texture.is_some() && self.depth_texture.is_some()
    }
}
