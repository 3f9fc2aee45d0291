/// Scene lighting spawned once per successful job.
pub mod lighting;

/// Relief plane mesh construction and rebuild handling.
pub mod relief_plane;

/// Host-page control events and their runtime handlers.
pub mod interaction;
