//! Take a picture and save it under `./captures/<shooting mode>/`

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use ptpip::{Camera, CameraConfig, CaptureSink, ShootingMode};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Writes every downloaded image to disk
struct DirectorySink {
    root: PathBuf,
}

impl CaptureSink for DirectorySink {
    fn store(&self, mode: ShootingMode, file_name: &str, data: Bytes) {
        let dir = self.root.join(mode.to_string());
        let path = dir.join(file_name);

        match fs::create_dir_all(&dir).and_then(|_| fs::write(&path, &data)) {
            Ok(()) => info!("Saved {}", path.display()),
            Err(e) => error!("Failed to save {}: {}", path.display(), e),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "ptpip=debug".into()))
        .init();

    let ip = std::env::var("CAMERA_IP").unwrap_or_else(|_| "192.168.122.1".to_string());
    let sink = Arc::new(DirectorySink {
        root: PathBuf::from("captures"),
    });

    let camera = Camera::connect(CameraConfig::new(ip), sink).await?;
    println!("Connected to {}", camera.device_info().model.as_deref().unwrap_or("camera"));

    let outcome = camera.take_picture().await?;
    match outcome.object_id {
        Some(id) if outcome.downloaded => println!("Captured object 0x{:08X}", id),
        Some(id) => println!("Captured object 0x{:08X}, download failed", id),
        None => println!("Shutter released but the camera reported no object"),
    }

    camera.disconnect().await?;
    Ok(())
}
