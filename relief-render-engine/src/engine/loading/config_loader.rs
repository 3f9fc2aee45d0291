use bevy::prelude::*;
use serde::Deserialize;

use constants::service::{
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_STATUS_ENDPOINT, DEFAULT_UPLOAD_ENDPOINT,
};

/// Deployment-specific service endpoints, shipped as a JSON asset so the
/// compiled engine can be pointed at a different backend.
#[derive(Asset, TypePath, Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub upload_endpoint: String,
    pub status_endpoint: String,
    pub poll_interval_secs: f32,
}

#[derive(Resource, Default)]
pub struct ServiceConfigLoader {
    handle: Option<Handle<ServiceConfig>>,
    applied: bool,
}

pub fn start_config_load(mut loader: ResMut<ServiceConfigLoader>, asset_server: Res<AssetServer>) {
    loader.handle = Some(asset_server.load("config/service.json"));
}

/// Resolved configuration the service client reads. Starts as compiled
/// defaults and is overwritten once the config asset arrives.
#[derive(Resource, Clone, Debug, PartialEq)]
pub struct ActiveServiceConfig {
    pub upload_endpoint: String,
    pub status_endpoint: String,
    pub poll_interval_secs: f32,
}

impl Default for ActiveServiceConfig {
    fn default() -> Self {
        Self {
            upload_endpoint: DEFAULT_UPLOAD_ENDPOINT.into(),
            status_endpoint: DEFAULT_STATUS_ENDPOINT.into(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

pub fn apply_loaded_config(
    mut loader: ResMut<ServiceConfigLoader>,
    configs: Res<Assets<ServiceConfig>>,
    mut active: ResMut<ActiveServiceConfig>,
) {
    if loader.applied {
        return;
    }
    let Some(handle) = &loader.handle else {
        return;
    };
    if let Some(config) = configs.get(handle) {
        *active = ActiveServiceConfig {
            upload_endpoint: config.upload_endpoint.clone(),
            status_endpoint: config.status_endpoint.clone(),
            poll_interval_secs: config.poll_interval_secs,
        };
        loader.applied = true;
        info!(
            "Service config loaded: upload={} status={} poll every {}s",
            active.upload_endpoint, active.status_endpoint, active.poll_interval_secs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_compiled_constants() {
        let config = ActiveServiceConfig::default();
        assert_eq!(config.upload_endpoint, DEFAULT_UPLOAD_ENDPOINT);
        assert_eq!(config.status_endpoint, DEFAULT_STATUS_ENDPOINT);
        assert!((config.poll_interval_secs - DEFAULT_POLL_INTERVAL_SECS).abs() < f32::EPSILON);
    }

    #[test]
    fn config_asset_deserializes() {
        let config: ServiceConfig = serde_json::from_str(
            r#"{"upload_endpoint": "/api/upload", "status_endpoint": "/api/status", "poll_interval_secs": 2.5}"#,
        )
        .unwrap();
        assert_eq!(config.upload_endpoint, "/api/upload");
        assert_eq!(config.status_endpoint, "/api/status");
        assert!((config.poll_interval_secs - 2.5).abs() < f32::EPSILON);
    }
}
