#![allow(dead_code)]

use std::time::Duration;

use axum::Router;
use medchain::matching::{EmergencyDescriptor, GeoPoint};

pub const HOSPITALS_JSON: &str = include_str!("../../assets/hospitals.json");

/// Serves `router` on an ephemeral loopback port and returns its base URL.
pub async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fake backend serves");
    });
    format!("http://{addr}")
}

pub fn request_timeout() -> Duration {
    Duration::from_secs(5)
}

pub fn bucharest_emergency(severity: u8) -> EmergencyDescriptor {
    EmergencyDescriptor::new(
        Some("emergency-bucharest".into()),
        GeoPoint::new(44.42, 26.10),
        severity,
        "cardiac",
        None,
    )
    .expect("valid emergency")
}
