use bevy::asset::RenderAssetUsages;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology};
use bevy::window::WindowResized;

use crate::engine::scene::interaction::RenderParameters;
use crate::engine::camera::orbit_camera::OrbitCamera;
use crate::engine::shaders::DepthReliefMaterial;
use constants::render_settings::PLANE_SUBDIVISIONS;

/// Marker for the single displaced plane in the scene.
#[derive(Component)]
pub struct ReliefPlane;

/// Decoded photo and depth textures plus the photo's aspect ratio, inserted
/// once both textures are ready.
#[derive(Resource)]
pub struct ReliefTextures {
    pub color: Handle<Image>,
    pub depth: Handle<Image>,
    pub image_aspect: f32,
}

/// Request to (re)build the plane at the given aspect ratio. The first build
/// uses the photo's aspect; field-of-view and resize rebuilds use the
/// viewport's.
#[derive(Event)]
pub struct RebuildPlaneEvent {
    pub aspect: f32,
}

/// Plane extent that exactly fills the vertical field of view at the given
/// camera distance: height = 2 * tan(fov/2) * distance, width = height * aspect.
pub fn plane_extent(fov_degrees: f32, distance: f32, aspect: f32) -> (f32, f32) {
    let height = 2.0 * (fov_degrees.to_radians() * 0.5).tan() * distance;
    (height * aspect, height)
}

/// Build the subdivided relief grid in the XY plane with +Z normals.
/// UV v runs top-down so the photo reads upright.
pub fn build_relief_plane_mesh(width: f32, height: f32, subdivisions: u32) -> Mesh {
    let verts_per_axis = subdivisions + 1;
    let vertex_count = (verts_per_axis * verts_per_axis) as usize;

    let mut positions: Vec<[f32; 3]> = Vec::with_capacity(vertex_count);
    let mut normals: Vec<[f32; 3]> = Vec::with_capacity(vertex_count);
    let mut uvs: Vec<[f32; 2]> = Vec::with_capacity(vertex_count);

    for y in 0..verts_per_axis {
        let v = y as f32 / subdivisions as f32;
        for x in 0..verts_per_axis {
            let u = x as f32 / subdivisions as f32;
            positions.push([(u - 0.5) * width, (v - 0.5) * height, 0.0]);
            normals.push([0.0, 0.0, 1.0]);
            uvs.push([u, 1.0 - v]);
        }
    }

    let mut indices: Vec<u32> = Vec::with_capacity((subdivisions * subdivisions * 6) as usize);
    for y in 0..subdivisions {
        for x in 0..subdivisions {
            let i0 = y * verts_per_axis + x;
            let i1 = i0 + 1;
            let i2 = i0 + verts_per_axis;
            let i3 = i2 + 1;
            // Counter-clockwise as seen from +Z.
            indices.extend_from_slice(&[i0, i1, i2, i1, i3, i2]);
        }
    }

    let mut mesh = Mesh::new(
        PrimitiveTopology::TriangleList,
        RenderAssetUsages::default(),
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    mesh.insert_indices(Indices::U32(indices));
    mesh
}

/// Replace the plane. The previous entity's mesh and material assets are
/// removed before the new plane is spawned, so parameter churn never
/// accumulates GPU resources. Multiple requests in one frame collapse into
/// the last one.
pub fn rebuild_relief_plane(
    mut events: EventReader<RebuildPlaneEvent>,
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<DepthReliefMaterial>>,
    textures: Option<Res<ReliefTextures>>,
    params: Option<Res<RenderParameters>>,
    orbit: Option<Res<OrbitCamera>>,
    existing: Query<(Entity, &Mesh3d, &MeshMaterial3d<DepthReliefMaterial>), With<ReliefPlane>>,
) {
    let Some(event) = events.read().last() else {
        return;
    };
    let (Some(textures), Some(params), Some(orbit)) = (textures, params, orbit) else {
        return;
    };

    for (entity, mesh, material) in &existing {
        meshes.remove(&mesh.0);
        materials.remove(&material.0);
        commands.entity(entity).despawn();
    }

    let (width, height) = plane_extent(params.fov_degrees, orbit.distance, event.aspect);
    let mesh = meshes.add(build_relief_plane_mesh(width, height, PLANE_SUBDIVISIONS));
    let material = materials.add(DepthReliefMaterial {
        color_texture: textures.color.clone(),
        depth_texture: textures.depth.clone(),
        params: Vec4::new(params.displacement_scale, 0.0, 0.0, 0.0),
    });

    commands.spawn((
        Mesh3d(mesh),
        MeshMaterial3d(material),
        Transform::default(),
        ReliefPlane,
    ));
}

/// Viewport resize rebuilds the plane at the new aspect, if one exists.
/// Camera aspect and surface size are maintained by the renderer itself.
pub fn watch_window_resize(
    mut resize_events: EventReader<WindowResized>,
    mut rebuild: EventWriter<RebuildPlaneEvent>,
    planes: Query<(), With<ReliefPlane>>,
) {
    let Some(resized) = resize_events.read().last() else {
        return;
    };
    if planes.is_empty() || resized.height <= 0.0 {
        return;
    }
    rebuild.write(RebuildPlaneEvent {
        aspect: resized.width / resized.height,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scene::interaction::RenderParameters;

    #[test]
    fn plane_extent_fills_frustum() {
        // At the base pose the plane must exactly fill the 45 degree
        // vertical frustum at distance 1.
        let (width, height) = plane_extent(45.0, 1.0, 1.5);
        let expected_height = 2.0 * (22.5f32).to_radians().tan();
        assert!((height - expected_height).abs() < 1e-6);
        assert!((width - expected_height * 1.5).abs() < 1e-6);
    }

    #[test]
    fn mesh_has_grid_resolution() {
        let mesh = build_relief_plane_mesh(2.0, 1.0, PLANE_SUBDIVISIONS);
        let per_axis = (PLANE_SUBDIVISIONS + 1) as usize;
        assert_eq!(mesh.count_vertices(), per_axis * per_axis);
        assert_eq!(
            mesh.indices().expect("indexed mesh").len(),
            (PLANE_SUBDIVISIONS * PLANE_SUBDIVISIONS * 6) as usize
        );
    }

    #[test]
    fn mesh_spans_requested_extent() {
        let mesh = build_relief_plane_mesh(2.0, 1.0, 4);
        let positions = mesh
            .attribute(Mesh::ATTRIBUTE_POSITION)
            .and_then(|values| values.as_float3())
            .expect("position attribute");

        let min_x = positions.iter().map(|p| p[0]).fold(f32::INFINITY, f32::min);
        let max_x = positions
            .iter()
            .map(|p| p[0])
            .fold(f32::NEG_INFINITY, f32::max);
        let min_y = positions.iter().map(|p| p[1]).fold(f32::INFINITY, f32::min);
        let max_y = positions
            .iter()
            .map(|p| p[1])
            .fold(f32::NEG_INFINITY, f32::max);

        assert!((min_x + 1.0).abs() < 1e-6 && (max_x - 1.0).abs() < 1e-6);
        assert!((min_y + 0.5).abs() < 1e-6 && (max_y - 0.5).abs() < 1e-6);
        assert!(positions.iter().all(|p| p[2] == 0.0));
    }

    fn rebuild_test_app() -> App {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .init_asset::<Mesh>()
            .init_asset::<DepthReliefMaterial>()
            .init_resource::<RenderParameters>()
            .init_resource::<OrbitCamera>()
            .insert_resource(ReliefTextures {
                color: Handle::default(),
                depth: Handle::default(),
                image_aspect: 1.5,
            })
            .add_event::<RebuildPlaneEvent>()
            .add_systems(Update, rebuild_relief_plane);
        app
    }

    fn plane_entities(app: &mut App) -> Vec<(Entity, AssetId<Mesh>)> {
        let mut query = app
            .world_mut()
            .query_filtered::<(Entity, &Mesh3d), With<ReliefPlane>>();
        query
            .iter(app.world())
            .map(|(entity, mesh)| (entity, mesh.0.id()))
            .collect()
    }

    #[test]
    fn rebuild_keeps_exactly_one_plane_and_releases_assets() {
        let mut app = rebuild_test_app();

        app.world_mut().send_event(RebuildPlaneEvent { aspect: 1.5 });
        app.update();
        let first = plane_entities(&mut app);
        assert_eq!(first.len(), 1);

        // A burst of rebuild triggers (field-of-view change plus resize)
        // still leaves exactly one plane, and the first mesh is gone from
        // the asset collection.
        app.world_mut().send_event(RebuildPlaneEvent { aspect: 1.0 });
        app.world_mut().send_event(RebuildPlaneEvent { aspect: 2.0 });
        app.update();
        app.update();

        let rebuilt = plane_entities(&mut app);
        assert_eq!(rebuilt.len(), 1);
        assert_ne!(rebuilt[0].1, first[0].1);

        let meshes = app.world().resource::<Assets<Mesh>>();
        assert!(meshes.get(first[0].1).is_none(), "old mesh not released");
        assert!(meshes.get(rebuilt[0].1).is_some());
        assert_eq!(meshes.iter().count(), 1);
    }
}
