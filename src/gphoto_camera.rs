// GPhoto2-based camera for USB DSLRs
// Drives the gphoto2 CLI for detection and still capture

use async_trait::async_trait;
use image::RgbImage;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::camera::{decode_frame, Camera};
use crate::errors::CameraError;
use crate::storage::{ensure_directory, next_free_path};

pub struct GPhotoCamera {
    /// Where downloaded captures land before they are decoded and removed.
    scratch_dir: PathBuf,
    name: String,
    detected: bool,
}

impl GPhotoCamera {
    pub fn new(scratch_dir: PathBuf) -> Self {
        GPhotoCamera {
            scratch_dir,
            name: "NONE".to_string(),
            detected: false,
        }
    }

    /// Desktop volume monitors grab the USB camera; free it before talking
    /// to it.
    async fn kill_gphoto_processes() {
        let _ = Command::new("pkill").args(["-f", "gphoto2"]).output().await;
    }

    /// Check the camera is connected and remember its model.
    pub async fn detect(&mut self) -> Result<(), CameraError> {
        info!("Detecting camera via gphoto2...");

        let output = Command::new("gphoto2")
            .arg("--auto-detect")
            .output()
            .await
            .map_err(|e| {
                CameraError::NotReady(format!("Failed to run gphoto2 --auto-detect: {}", e))
            })?;

        let output_str = String::from_utf8_lossy(&output.stdout);
        debug!("Camera detection output: {}", output_str);

        match parse_auto_detect(&output_str) {
            Some(model) => {
                info!("Camera detected: {}", model);
                self.name = model;
                self.detected = true;
                Ok(())
            }
            None => Err(CameraError::NotReady(
                "No camera detected. Please ensure camera is connected and turned on.".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Camera for GPhotoCamera {
    async fn take_pic(&mut self) -> Result<RgbImage, CameraError> {
        if !self.detected {
            self.detect().await?;
        }

        Self::kill_gphoto_processes().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        ensure_directory(&self.scratch_dir)
            .map_err(|e| CameraError::CannotTakePicture(e.to_string()))?;
        let output_path = next_free_path(&self.scratch_dir, ".gphoto_capture", "jpg");
        let output_str = output_path.to_string_lossy().into_owned();

        let output = Command::new("gphoto2")
            .args([
                "--capture-image-and-download",
                "--filename",
                output_str.as_str(),
                "--force-overwrite",
            ])
            .output()
            .await
            .map_err(|e| {
                CameraError::CannotTakePicture(format!("Failed to run capture command: {}", e))
            })?;

        if !output.status.success() {
            // detect again next time, the camera may have been unplugged
            self.detected = false;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CameraError::CannotTakePicture(format!(
                "Failed to capture photo: {}",
                stderr.trim()
            )));
        }

        let jpeg_data = tokio::fs::read(&output_path).await?;
        if let Err(e) = tokio::fs::remove_file(&output_path).await {
            warn!("Failed to remove capture {:?}: {}", output_path, e);
        }

        decode_frame(&jpeg_data)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Model name of the first USB camera in `gphoto2 --auto-detect` output.
pub fn parse_auto_detect(output: &str) -> Option<String> {
    output
        .lines()
        .find_map(|line| line.find("usb:").map(|pos| line[..pos].trim().to_string()))
        .filter(|model| !model.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auto_detect() {
        let output = "Model                          Port\n\
                      ----------------------------------------------------------\n\
                      Canon EOS 1300D                usb:001,004\n";
        assert_eq!(parse_auto_detect(output).as_deref(), Some("Canon EOS 1300D"));
    }

    #[test]
    fn test_parse_auto_detect_without_camera() {
        let output = "Model                          Port\n\
                      ----------------------------------------------------------\n";
        assert_eq!(parse_auto_detect(output), None);
        assert_eq!(parse_auto_detect(""), None);
    }

    #[test]
    fn test_new_camera_is_undetected() {
        let camera = GPhotoCamera::new(PathBuf::from("photos"));
        assert_eq!(camera.name(), "NONE");
        assert!(!camera.detected);
    }
}
