use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use crate::engine::camera::orbit_camera::{OrbitCamera, Oscillation};
use crate::engine::scene::relief_plane::{RebuildPlaneEvent, ReliefPlane};
use crate::engine::shaders::DepthReliefMaterial;
use constants::render_settings::{BASE_FOV_DEGREES, DEFAULT_DISPLACEMENT_SCALE};

/// User-adjustable render parameters. Displacement drives a live uniform
/// update only; field of view drives a camera move and a plane rebuild.
#[derive(Resource)]
pub struct RenderParameters {
    pub displacement_scale: f32,
    pub fov_degrees: f32,
}

impl Default for RenderParameters {
    fn default() -> Self {
        Self {
            displacement_scale: DEFAULT_DISPLACEMENT_SCALE,
            fov_degrees: BASE_FOV_DEGREES,
        }
    }
}

#[derive(Event)]
pub struct SetDisplacementEvent {
    pub value: f32,
}

#[derive(Event)]
pub struct SetFovEvent {
    pub degrees: f32,
}

#[derive(Event)]
pub struct ResetCameraEvent;

#[derive(Event)]
pub struct ToggleAnimationEvent;

/// Apply a field-of-view change: the camera backs off (or moves in) so the
/// plane's apparent size is preserved relative to the base pose.
pub fn set_fov(params: &mut RenderParameters, orbit: &mut OrbitCamera, degrees: f32) {
    params.fov_degrees = degrees;
    orbit.distance = OrbitCamera::distance_for_fov(degrees);
}

/// Displacement slider: write the live shader uniform on the existing
/// material. No geometry rebuild.
pub fn apply_displacement_events(
    mut events: EventReader<SetDisplacementEvent>,
    mut params: ResMut<RenderParameters>,
    mut materials: ResMut<Assets<DepthReliefMaterial>>,
    planes: Query<&MeshMaterial3d<DepthReliefMaterial>, With<ReliefPlane>>,
) {
    for event in events.read() {
        params.displacement_scale = event.value;
        for material_handle in &planes {
            if let Some(material) = materials.get_mut(&material_handle.0) {
                material.params.x = event.value;
            }
        }
    }
}

/// Field-of-view slider: move the camera per the distance law, update the
/// projection, and rebuild the plane at the viewport aspect.
pub fn apply_fov_events(
    mut events: EventReader<SetFovEvent>,
    mut params: ResMut<RenderParameters>,
    mut orbit: ResMut<OrbitCamera>,
    mut projections: Query<&mut Projection, With<Camera3d>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    planes: Query<(), With<ReliefPlane>>,
    mut rebuild: EventWriter<RebuildPlaneEvent>,
) {
    let Some(event) = events.read().last() else {
        return;
    };

    set_fov(&mut params, &mut orbit, event.degrees);

    if let Ok(mut projection) = projections.single_mut() {
        if let Projection::Perspective(perspective) = projection.as_mut() {
            perspective.fov = event.degrees.to_radians();
        }
    }

    if planes.is_empty() {
        return;
    }
    if let Ok(window) = windows.single() {
        rebuild.write(RebuildPlaneEvent {
            aspect: window.width() / window.height(),
        });
    }
}

/// Reset button: snap back to the distance-1 pose aimed at the origin.
pub fn apply_reset_events(
    mut events: EventReader<ResetCameraEvent>,
    mut orbit: ResMut<OrbitCamera>,
    mut cameras: Query<&mut Transform, With<Camera3d>>,
) {
    if events.read().next().is_none() {
        return;
    }
    orbit.reset();
    if let Ok(mut transform) = cameras.single_mut() {
        *transform = Transform::from_translation(orbit.position()).looking_at(orbit.target, Vec3::Y);
    }
}

pub fn apply_toggle_animation_events(
    mut events: EventReader<ToggleAnimationEvent>,
    mut oscillation: ResMut<Oscillation>,
) {
    for _ in events.read() {
        oscillation.enabled = !oscillation.enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scene::relief_plane::{
        RebuildPlaneEvent, ReliefTextures, rebuild_relief_plane,
    };

    #[test]
    fn fov_change_moves_camera_per_law() {
        let mut params = RenderParameters::default();
        let mut orbit = OrbitCamera::default();

        set_fov(&mut params, &mut orbit, 90.0);
        let expected = (22.5f32).to_radians().tan() / (45.0f32).to_radians().tan();
        assert!((orbit.distance - expected).abs() < 1e-6);
        assert!((params.fov_degrees - 90.0).abs() < f32::EPSILON);

        set_fov(&mut params, &mut orbit, 45.0);
        assert!((orbit.distance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn displacement_updates_uniform_without_rebuilding() {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .init_asset::<Mesh>()
            .init_asset::<DepthReliefMaterial>()
            .init_resource::<RenderParameters>()
            .init_resource::<OrbitCamera>()
            .insert_resource(ReliefTextures {
                color: Handle::default(),
                depth: Handle::default(),
                image_aspect: 1.0,
            })
            .add_event::<RebuildPlaneEvent>()
            .add_event::<SetDisplacementEvent>()
            .add_systems(Update, (rebuild_relief_plane, apply_displacement_events));

        app.world_mut().send_event(RebuildPlaneEvent { aspect: 1.0 });
        app.update();

        let mut query = app
            .world_mut()
            .query_filtered::<(&Mesh3d, &MeshMaterial3d<DepthReliefMaterial>), With<ReliefPlane>>();
        let (mesh_id, material_id) = {
            let (mesh, material) = query.single(app.world()).expect("plane spawned");
            (mesh.0.id(), material.0.id())
        };
        let vertex_count = app
            .world()
            .resource::<Assets<Mesh>>()
            .get(mesh_id)
            .expect("mesh")
            .count_vertices();

        app.world_mut()
            .send_event(SetDisplacementEvent { value: 0.85 });
        app.update();

        // Same mesh, same material instance, new uniform value.
        let (mesh, material) = query.single(app.world()).expect("plane still present");
        assert_eq!(mesh.0.id(), mesh_id);
        assert_eq!(material.0.id(), material_id);

        let materials = app.world().resource::<Assets<DepthReliefMaterial>>();
        let material = materials.get(material_id).expect("material");
        assert!((material.params.x - 0.85).abs() < 1e-6);
        assert!(
            (app.world().resource::<RenderParameters>().displacement_scale - 0.85).abs() < 1e-6
        );

        let meshes = app.world().resource::<Assets<Mesh>>();
        assert_eq!(meshes.get(mesh_id).expect("mesh").count_vertices(), vertex_count);
    }
}
