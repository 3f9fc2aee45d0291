/// Depth-relief shader material
use bevy::{
    prelude::*,
    reflect::TypePath,
    render::render_resource::{AsBindGroup, ShaderRef},
};

/// Plane material: photo for colour, depth map for vertex displacement.
///
/// The vertex stage samples the depth texture's red channel at each vertex UV
/// and offsets the vertex along its normal by `sample * params.x`. The
/// fragment stage samples the colour texture only.
#[derive(Asset, TypePath, AsBindGroup, Debug, Clone)]
pub struct DepthReliefMaterial {
    #[texture(0)]
    #[sampler(1)]
    pub color_texture: Handle<Image>,

    #[texture(2)]
    #[sampler(3)]
    pub depth_texture: Handle<Image>,

    /// x: displacement scale, yzw: unused
    #[uniform(4)]
    pub params: Vec4,
}

impl Material for DepthReliefMaterial {
    fn vertex_shader() -> ShaderRef {
        "shaders/depth_relief.wgsl".into()
    }

    fn fragment_shader() -> ShaderRef {
        "shaders/depth_relief.wgsl".into()
    }
}
