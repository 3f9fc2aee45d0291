use bevy::prelude::*;

/// One ambient and one directional light, spawned with the scene. The relief
/// material is effectively unlit, so these exist for any standard-material
/// helpers added to the scene later.
pub fn spawn_lighting(commands: &mut Commands) {
    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 80.0,
        ..default()
    });

    commands.spawn((
        DirectionalLight {
            shadows_enabled: false,
            ..default()
        },
        Transform::from_xyz(0.0, 2.0, 2.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
}
