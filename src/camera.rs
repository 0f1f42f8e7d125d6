// Camera functionality module

use async_trait::async_trait;
use image::RgbImage;
use std::path::PathBuf;
use tracing::{info, warn};

#[cfg(target_os = "linux")]
use v4l::buffer::Type;
#[cfg(target_os = "linux")]
use v4l::device::Device;
#[cfg(target_os = "linux")]
use v4l::io::traits::CaptureStream;
#[cfg(target_os = "linux")]
use v4l::io::userptr;
#[cfg(target_os = "linux")]
use v4l::video::Capture;
#[cfg(target_os = "linux")]
use v4l::{Format, FourCC};

use crate::config::{CameraBackend, Config};
use crate::errors::CameraError;
use crate::gphoto_camera::GPhotoCamera;

/// Index tried once when the configured device cannot be opened.
pub const FALLBACK_INDEX: u32 = 0;

/// Frames dropped after the stream starts; auto exposure needs a moment.
#[cfg(target_os = "linux")]
const WARMUP_FRAMES: usize = 3;

#[async_trait]
pub trait Camera: Send {
    /// One still frame. Failures only spoil the running session.
    async fn take_pic(&mut self) -> Result<RgbImage, CameraError>;

    fn name(&self) -> &str;
}

/// How a device index is turned into a readable name. Picked once for the
/// host platform.
pub trait CameraNaming: Send + Sync {
    fn name_of(&self, index: u32) -> String;
}

pub struct SysfsCameraNaming {
    root: PathBuf,
}

impl SysfsCameraNaming {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Default for SysfsCameraNaming {
    fn default() -> Self {
        Self::new("/sys/class/video4linux")
    }
}

impl CameraNaming for SysfsCameraNaming {
    fn name_of(&self, index: u32) -> String {
        let path = self.root.join(format!("video{}", index)).join("name");
        std::fs::read_to_string(path)
            .map(|name| name.trim().to_string())
            .ok()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "NONE".to_string())
    }
}

pub struct NoCameraNaming;

impl CameraNaming for NoCameraNaming {
    fn name_of(&self, _index: u32) -> String {
        "NONE".to_string()
    }
}

#[cfg(target_os = "linux")]
pub fn platform_naming() -> Box<dyn CameraNaming> {
    Box::new(SysfsCameraNaming::default())
}

#[cfg(not(target_os = "linux"))]
pub fn platform_naming() -> Box<dyn CameraNaming> {
    Box::new(NoCameraNaming)
}

/// Try `index`, then [`FALLBACK_INDEX`] once. When both fail the error
/// names the requested index.
pub fn open_with_fallback<T>(
    index: u32,
    mut open: impl FnMut(u32) -> Result<T, CameraError>,
) -> Result<(u32, T), CameraError> {
    match open(index) {
        Ok(device) => Ok((index, device)),
        Err(e) if index != FALLBACK_INDEX => {
            warn!(
                "Camera {} unavailable ({}), falling back to camera {}",
                index, e, FALLBACK_INDEX
            );
            open(FALLBACK_INDEX)
                .map(|device| (FALLBACK_INDEX, device))
                .map_err(|_| CameraError::InvalidIndex(index))
        }
        Err(_) => Err(CameraError::InvalidIndex(index)),
    }
}

pub fn decode_frame(data: &[u8]) -> Result<RgbImage, CameraError> {
    image::load_from_memory(data)
        .map(|img| img.to_rgb8())
        .map_err(|e| CameraError::Decode(e.to_string()))
}

/// Build the configured backend. Nothing is opened until the first capture.
pub fn new_camera(config: &Config) -> Box<dyn Camera> {
    match config.camera.backend {
        CameraBackend::V4l => Box::new(V4lCamera::new(
            config.camera.default,
            config.camera.width,
            config.camera.height,
            platform_naming(),
        )),
        CameraBackend::Gphoto => Box::new(GPhotoCamera::new(config.paths.photos.clone())),
    }
}

pub struct V4lCamera {
    requested: u32,
    index: u32,
    width: u32,
    height: u32,
    name: String,
    naming: Box<dyn CameraNaming>,
    #[cfg(target_os = "linux")]
    device: Option<Device>,
}

impl V4lCamera {
    pub fn new(index: u32, width: u32, height: u32, naming: Box<dyn CameraNaming>) -> Self {
        let name = naming.name_of(index);
        Self {
            requested: index,
            index,
            width,
            height,
            name,
            naming,
            #[cfg(target_os = "linux")]
            device: None,
        }
    }
}

#[cfg(target_os = "linux")]
impl V4lCamera {
    fn ensure_open(&mut self) -> Result<(), CameraError> {
        if self.device.is_some() {
            return Ok(());
        }

        let (width, height) = (self.width, self.height);
        let (index, device) =
            open_with_fallback(self.requested, |i| open_device(i, width, height))?;

        self.index = index;
        self.name = self.naming.name_of(index);
        info!(index, name = %self.name, "Camera opened");
        self.device = Some(device);
        Ok(())
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl Camera for V4lCamera {
    async fn take_pic(&mut self) -> Result<RgbImage, CameraError> {
        self.ensure_open()?;
        let mut device = self
            .device
            .take()
            .ok_or_else(|| CameraError::NotReady(format!("camera {} is closed", self.index)))?;

        let (device, grabbed) = tokio::task::spawn_blocking(move || {
            let grabbed = grab_frame(&mut device);
            (device, grabbed)
        })
        .await
        .map_err(|e| CameraError::CannotTakePicture(format!("capture task failed: {}", e)))?;

        match grabbed {
            Ok(jpeg) => {
                self.device = Some(device);
                decode_frame(&jpeg)
            }
            // reopened on the next capture
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// Internal implementation details
#[cfg(target_os = "linux")]
fn open_device(index: u32, width: u32, height: u32) -> Result<Device, CameraError> {
    let path = format!("/dev/video{}", index);
    let mut dev = Device::with_path(&path)
        .map_err(|e| CameraError::NotReady(format!("open {}: {}", path, e)))?;
    configure_device(&mut dev, width, height)?;
    Ok(dev)
}

#[cfg(target_os = "linux")]
fn configure_device(dev: &mut Device, width: u32, height: u32) -> Result<Format, CameraError> {
    let mut fmt = dev
        .format()
        .map_err(|e| CameraError::NotReady(format!("format(): {e}")))?;
    fmt.width = width;
    fmt.height = height;
    fmt.fourcc = FourCC::new(b"MJPG");
    let fmt = dev
        .set_format(&fmt)
        .map_err(|e| CameraError::NotReady(format!("set_format(): {e}")))?;

    if fmt.fourcc == FourCC::new(b"MJPG") {
        return Ok(fmt);
    }

    Err(CameraError::NotReady(format!(
        "Device does not support MJPEG, got {}. Only MJPEG is supported.",
        fmt.fourcc
    )))
}

#[cfg(target_os = "linux")]
fn grab_frame(dev: &mut Device) -> Result<Vec<u8>, CameraError> {
    let mut stream = userptr::Stream::with_buffers(dev, Type::VideoCapture, 4)
        .map_err(|e| CameraError::CannotTakePicture(format!("Failed to create UserptrStream: {e}")))?;

    for _ in 0..WARMUP_FRAMES {
        stream
            .next()
            .map_err(|e| CameraError::CannotTakePicture(format!("Userptr stream error: {e}")))?;
    }

    let (buffer, meta) = stream
        .next()
        .map_err(|e| CameraError::CannotTakePicture(format!("Userptr stream error: {e}")))?;
    let used = (meta.bytesused as usize).min(buffer.len());
    if used == 0 {
        return Err(CameraError::CannotTakePicture("empty frame".to_string()));
    }
    Ok(buffer[..used].to_vec())
}

// Non-Linux stub
#[cfg(not(target_os = "linux"))]
#[async_trait]
impl Camera for V4lCamera {
    async fn take_pic(&mut self) -> Result<RgbImage, CameraError> {
        let _ = (self.index, self.width, self.height, &self.naming);
        Err(CameraError::NotReady(format!(
            "V4L2 capture of camera {} is not supported on this platform",
            self.requested
        )))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgb};
    use std::io::Cursor;

    #[test]
    fn test_requested_index_opens() {
        let mut tried = Vec::new();
        let (index, device) = open_with_fallback(2, |i| {
            tried.push(i);
            Ok(format!("dev{}", i))
        })
        .unwrap();
        assert_eq!((index, device.as_str()), (2, "dev2"));
        assert_eq!(tried, vec![2]);
    }

    #[test]
    fn test_falls_back_to_default_index() {
        let mut tried = Vec::new();
        let (index, _) = open_with_fallback(3, |i| {
            tried.push(i);
            if i == 0 {
                Ok(())
            } else {
                Err(CameraError::NotReady("busy".into()))
            }
        })
        .unwrap();
        assert_eq!(index, 0);
        assert_eq!(tried, vec![3, 0]);
    }

    #[test]
    fn test_fallback_failure_names_requested_index() {
        let err = open_with_fallback::<()>(5, |_| Err(CameraError::NotReady("gone".into())))
            .unwrap_err();
        assert!(matches!(err, CameraError::InvalidIndex(5)));
    }

    #[test]
    fn test_default_index_is_tried_once() {
        let mut calls = 0;
        let err = open_with_fallback::<()>(0, |_| {
            calls += 1;
            Err(CameraError::NotReady("gone".into()))
        })
        .unwrap_err();
        assert!(matches!(err, CameraError::InvalidIndex(0)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_sysfs_naming() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("video1")).unwrap();
        std::fs::write(dir.path().join("video1/name"), "HD Pro Webcam C920\n").unwrap();

        let naming = SysfsCameraNaming::new(dir.path());
        assert_eq!(naming.name_of(1), "HD Pro Webcam C920");
        assert_eq!(naming.name_of(4), "NONE");
        assert_eq!(NoCameraNaming.name_of(1), "NONE");
    }

    #[test]
    fn test_decode_frame() {
        let image = RgbImage::from_pixel(8, 6, Rgb([10, 200, 30]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .unwrap();

        let decoded = decode_frame(bytes.get_ref()).unwrap();
        assert_eq!(decoded.dimensions(), (8, 6));
        assert_eq!(decoded.get_pixel(3, 3), &Rgb([10, 200, 30]));

        assert!(matches!(
            decode_frame(b"not an image"),
            Err(CameraError::Decode(_))
        ));
    }
}
