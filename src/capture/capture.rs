use std::time::Instant;

use anyhow::Error;
use log::{info, warn};
use opencv::core::{Mat, MatTraitConst, Point, Scalar};
use opencv::highgui;
use opencv::imgproc;
use opencv::videoio;
use opencv::videoio::{VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst};

use crate::config::config::CaptureConfig;

/// Consecutive failed reads tolerated before the device is declared lost.
const MAX_READ_FAILURES: u32 = 5;

/// Per-frame scratch threaded through the loop callbacks.
pub trait FrameScratch: Default {
    /// begin resets the scratch for a new frame.
    fn begin(&mut self, frame_id: u64);
}

pub type FrameCallback<C> = Box<dyn FnMut(&mut Mat, &mut C) -> Result<(), Error>>;

/// Single-threaded read, process, display loop over one capture device.
///
/// Callbacks run in registration order and communicate only through the
/// scratch value. The loop owns the device and the display window and
/// releases both on every exit path, including error exits.
pub struct VideoLoop<C> {
    capture: VideoCapture,
    title: String,
    quit_key: char,
    fps_overlay: Option<(i32, i32)>,
    previous_instant: Option<Instant>,
    callbacks: Vec<FrameCallback<C>>,
}

impl<C: FrameScratch> VideoLoop<C> {
    /// open acquires the capture device and creates the display window.
    ///
    /// Failing to open the device is reported distinctly, before any frame
    /// is read.
    ///
    /// # Arguments
    /// * `config` - device index, window title, quit key, FPS overlay
    ///
    /// # Returns
    /// * `Result<VideoLoop<C>, Error>`
    pub fn open(config: &CaptureConfig) -> Result<Self, Error> {
        let capture = VideoCapture::new(config.device_index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(Error::msg(format!(
                "capture - cannot open video device {}",
                config.device_index
            )));
        }
        highgui::named_window(&config.window_title, highgui::WINDOW_AUTOSIZE)?;
        info!("opened video device {}", config.device_index);

        Ok(VideoLoop {
            capture,
            title: config.window_title.clone(),
            quit_key: config.quit_key,
            fps_overlay: config.fps_overlay,
            previous_instant: None,
            callbacks: Vec::new(),
        })
    }

    /// add_callback appends a per-frame callback. Callbacks run in
    /// registration order, receive the current frame and the shared
    /// scratch, and perform their work through side effects on both.
    pub fn add_callback(&mut self, callback: FrameCallback<C>) {
        self.callbacks.push(callback);
    }

    /// run drives the loop until the quit key is pressed or the device is
    /// lost.
    ///
    /// Transient read failures are retried up to [`MAX_READ_FAILURES`]
    /// consecutive times, then treated as device loss.
    pub fn run(&mut self) -> Result<(), Error> {
        let mut ctx = C::default();
        let mut frame_id: u64 = 0;
        let mut read_failures: u32 = 0;

        loop {
            let mut frame = Mat::default();
            let grabbed = self.capture.read(&mut frame)?;
            if !grabbed || frame.empty() {
                read_failures += 1;
                warn!(
                    "frame read failed ({}/{})",
                    read_failures, MAX_READ_FAILURES
                );
                if read_failures >= MAX_READ_FAILURES {
                    return Err(Error::msg("capture - video device lost"));
                }
                continue;
            }
            read_failures = 0;

            let fps = self.tick();

            ctx.begin(frame_id);
            dispatch(&mut self.callbacks, &mut frame, &mut ctx)?;

            // no FPS value exists for the very first frame
            if let (Some(fps), Some((x, y))) = (fps, self.fps_overlay) {
                imgproc::put_text(
                    &mut frame,
                    &format!("fps: {}", fps),
                    Point::new(x, y),
                    imgproc::FONT_HERSHEY_COMPLEX,
                    1.0,
                    Scalar::new(255.0, 0.0, 255.0, 0.0),
                    2,
                    imgproc::LINE_8,
                    false,
                )?;
            }

            highgui::imshow(&self.title, &frame)?;
            if highgui::wait_key(1)? == self.quit_key as i32 {
                info!("quit key pressed, shutting down");
                return Ok(());
            }

            frame_id += 1;
        }
    }

    fn tick(&mut self) -> Option<i32> {
        let now = Instant::now();
        let fps = instantaneous_fps(self.previous_instant, now);
        self.previous_instant = Some(now);
        fps
    }
}

impl<C> Drop for VideoLoop<C> {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("failed to release capture device: {}", e);
        }
        if let Err(e) = highgui::destroy_all_windows() {
            warn!("failed to destroy display windows: {}", e);
        }
    }
}

/// instantaneous_fps computes 1 / delta against the previous frame
/// timestamp; the first frame has no previous timestamp and yields none.
pub(crate) fn instantaneous_fps(previous: Option<Instant>, now: Instant) -> Option<i32> {
    let delta = now.duration_since(previous?).as_secs_f32();
    if delta <= 0.0 {
        return None;
    }
    Some((1.0 / delta) as i32)
}

pub(crate) fn dispatch<C>(
    callbacks: &mut [FrameCallback<C>],
    frame: &mut Mat,
    ctx: &mut C,
) -> Result<(), Error> {
    for callback in callbacks.iter_mut() {
        callback(frame, ctx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use opencv::core::Mat;

    use super::{dispatch, instantaneous_fps, FrameCallback};

    #[test]
    fn test_first_frame_has_no_fps() {
        assert_eq!(instantaneous_fps(None, Instant::now()), None);
    }

    #[test]
    fn test_fps_from_frame_delta() {
        let now = Instant::now();
        let previous = now - Duration::from_millis(250);
        assert_eq!(instantaneous_fps(Some(previous), now), Some(4));
    }

    #[test]
    fn test_zero_delta_yields_no_fps() {
        let now = Instant::now();
        assert_eq!(instantaneous_fps(Some(now), now), None);
    }

    #[test]
    fn test_dispatch_preserves_registration_order() {
        let mut callbacks: Vec<FrameCallback<Vec<u32>>> = vec![
            Box::new(|_frame, order| {
                order.push(1);
                Ok(())
            }),
            Box::new(|_frame, order| {
                order.push(2);
                Ok(())
            }),
            Box::new(|_frame, order| {
                order.push(3);
                Ok(())
            }),
        ];

        let mut frame = Mat::default();
        let mut order = Vec::new();
        dispatch(&mut callbacks, &mut frame, &mut order).unwrap();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_dispatch_stops_on_error() {
        let mut callbacks: Vec<FrameCallback<Vec<u32>>> = vec![
            Box::new(|_frame, order| {
                order.push(1);
                Err(anyhow::Error::msg("stage failed"))
            }),
            Box::new(|_frame, order| {
                order.push(2);
                Ok(())
            }),
        ];

        let mut frame = Mat::default();
        let mut order = Vec::new();
        assert!(dispatch(&mut callbacks, &mut frame, &mut order).is_err());
        assert_eq!(order, vec![1]);
    }
}
