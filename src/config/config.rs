use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HandDetectionConfig {
    pub model_name: String,
    pub timeout: i32,
    pub mean: f32,
    pub scale: f32,
    pub max_hands: usize,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
}

impl HandDetectionConfig {
    pub fn new() -> Self {
        HandDetectionConfig {
            model_name: "hand_landmarker".to_string(),
            timeout: 20,
            mean: 0.0,
            scale: 0.00392156862745098,
            max_hands: 1,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TritonServerConfig {
    pub host: String,
    pub port: u16,
}

impl TritonServerConfig {
    pub fn new() -> Self {
        TritonServerConfig {
            host: "http://localhost".to_string(),
            port: 8001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    pub device_index: i32,
    pub window_title: String,
    pub quit_key: char,
    /// Overlay position for the FPS counter; `None` disables the overlay.
    pub fps_overlay: Option<(i32, i32)>,
}

impl CaptureConfig {
    pub fn new() -> Self {
        CaptureConfig {
            device_index: 0,
            window_title: "Volume Controller".to_string(),
            quit_key: 'q',
            fps_overlay: Some((10, 70)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeControlConfig {
    /// Fingertip distance mapped to the endpoint minimum, in pixels.
    pub min_length: f32,
    /// Fingertip distance mapped to the endpoint maximum, in pixels.
    pub max_length: f32,
    pub draw_landmarks: bool,
}

impl VolumeControlConfig {
    pub fn new() -> Self {
        VolumeControlConfig {
            min_length: 35.0,
            max_length: 300.0,
            draw_landmarks: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MixerConfig {
    pub card: String,
    pub control: String,
}

impl MixerConfig {
    pub fn new() -> Self {
        MixerConfig {
            card: "default".to_string(),
            control: "Master".to_string(),
        }
    }
}
