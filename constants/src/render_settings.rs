/// Vertical field of view the camera starts with, in degrees
pub const BASE_FOV_DEGREES: f32 = 45.0;

/// Camera distance from the origin at the base field of view
pub const BASE_CAMERA_DISTANCE: f32 = 1.0;

/// Near clip plane
pub const CAMERA_NEAR: f32 = 0.1;

/// Far clip plane
pub const CAMERA_FAR: f32 = 1000.0;

/// Displacement multiplier applied to the sampled depth value at startup
pub const DEFAULT_DISPLACEMENT_SCALE: f32 = 0.5;

/// Grid subdivisions per axis of the relief plane (vertex resolution for displacement)
pub const PLANE_SUBDIVISIONS: u32 = 256;

/// Horizontal nudge applied to the camera per frame while the sway animation runs
pub const OSCILLATION_STEP: f32 = 0.001;

/// Horizontal offset at which the sway animation reverses direction
pub const OSCILLATION_LIMIT: f32 = 0.1;
