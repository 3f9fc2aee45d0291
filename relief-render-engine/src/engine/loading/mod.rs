/// Service configuration loaded as a JSON asset.
pub mod config_loader;

/// Texture readiness tracking between depth completion and first render.
pub mod progress;

/// Fetch and decode of the photo and its depth map into GPU textures.
pub mod texture_fetch;
