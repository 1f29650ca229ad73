//! Webcam hand-gesture volume control.
//!
//! Builds the configuration, wires the landmark source and the audio
//! endpoint into the pipeline, and drives the frame loop until the quit
//! key is pressed.

use anyhow::Error;
use log::info;

use rs_gesture_volume::capture::capture::VideoLoop;
use rs_gesture_volume::config::config::{
    CaptureConfig, HandDetectionConfig, MixerConfig, TritonServerConfig, VolumeControlConfig,
};
use rs_gesture_volume::helper::hand_helper::HandLandmarkSource;
use rs_gesture_volume::modules::audio_endpoint::AlsaEndpoint;
use rs_gesture_volume::modules::hand_landmark_client::HandLandmarkClient;
use rs_gesture_volume::pipeline::pipeline::{FrameContext, VolumePipeline};
use rs_gesture_volume::triton_client::client::TritonInferenceClient;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Error> {
    let server_config = TritonServerConfig::new();
    let detection_config = HandDetectionConfig::new();
    let capture_config = CaptureConfig::new();
    let mixer_config = MixerConfig::new();
    let volume_config = VolumeControlConfig::new();

    let rt = tokio::runtime::Runtime::new()?;

    let (triton_client, model_config) = rt.block_on(async {
        let client = TritonInferenceClient::new(&server_config.host, server_config.port).await?;
        if !client.is_server_live().await? {
            return Err(Error::msg("inference server is not live"));
        }
        let model_config = client.model_config(&detection_config.model_name).await?;
        Ok::<_, Error>((client, model_config))
    })?;
    info!(
        "connected to inference server at {}:{}",
        server_config.host, server_config.port
    );

    let landmark_client = HandLandmarkClient::new(triton_client, model_config, detection_config);
    let source = HandLandmarkSource::new(landmark_client, rt.handle().clone());

    let endpoint = AlsaEndpoint::new(&mixer_config.card, &mixer_config.control)?;
    info!(
        "audio endpoint ready on card {} control {}",
        mixer_config.card, mixer_config.control
    );

    let mut video: VideoLoop<FrameContext> = VideoLoop::open(&capture_config)?;
    let pipeline = VolumePipeline::new(source, endpoint, volume_config);
    pipeline.register(&mut video);

    video.run()
}
