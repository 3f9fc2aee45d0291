/// Orbit camera resource, mouse controller, and the sway animation.
pub mod orbit_camera;
