//! Client for the remote depth-estimation service.
//!
//! Uploads the selected image as multipart form data, then polls the status
//! endpoint until the job reaches a terminal state. All network work runs in
//! spawned futures; results re-enter the ECS through the [`client::ServiceBridge`]
//! queue drained once per frame.

pub mod client;
pub mod status;
pub mod upload;
