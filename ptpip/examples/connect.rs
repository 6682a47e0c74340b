//! Connect, print the device info and the cached properties

use std::sync::Arc;

use ptpip::{Camera, CameraConfig, MemorySink};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "ptpip=info".into()))
        .init();

    // Change to your camera IP
    let ip = std::env::var("CAMERA_IP").unwrap_or_else(|_| "192.168.122.1".to_string());

    println!("Connecting to {}...", ip);
    let camera = Camera::connect(CameraConfig::new(ip), Arc::new(MemorySink::new())).await?;

    println!("{}", camera.device_info());
    println!("Manufacturer tables: {}", camera.manufacturer());

    for code in camera.device_info().supported_properties.iter().copied() {
        let Ok(code) = ptpip::PropertyCode::try_from(code) else {
            continue;
        };
        if let Some(property) = camera.cached_property(code) {
            println!("  {:<40} {:?}", code.to_string(), property.current_value);
        }
    }

    camera.disconnect().await?;
    println!("Disconnected");

    Ok(())
}
