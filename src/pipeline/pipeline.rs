use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::Error;
use opencv::core::{Mat, Point, Rect, Scalar};
use opencv::imgproc;

use crate::capture::capture::{FrameScratch, VideoLoop};
use crate::config::config::VolumeControlConfig;
use crate::helper::hand_helper::HandLandmarkSource;
use crate::modules::audio_endpoint::EndpointVolume;
use crate::utils::coordinate::{
    euclidean_distance, Coordinate2D, FingertipPair, HandLandmark, INDEX_FINGER_TIP, THUMB_TIP,
};
use crate::utils::utils::{interp, round2};

// Feedback bar geometry, in frame pixels. The bar fills upward from
// BAR_BOTTOM to BAR_TOP.
const BAR_LEFT: i32 = 50;
const BAR_RIGHT: i32 = 85;
const BAR_TOP: i32 = 150;
const BAR_BOTTOM: i32 = 400;
const BAR_TEXT_POS: (i32, i32) = (50, 450);

const MARKER_RADIUS: i32 = 10;

/// Per-frame scratch threaded through the pipeline stages. Every map is
/// keyed by hand id and valid only within the frame it was built for.
#[derive(Debug, Clone, Default)]
pub struct FrameContext {
    pub frame_id: u64,
    pub hands: BTreeMap<usize, Vec<HandLandmark>>,
    pub fingertips: BTreeMap<usize, FingertipPair>,
    pub lengths: BTreeMap<usize, f32>,
}

impl FrameScratch for FrameContext {
    fn begin(&mut self, frame_id: u64) {
        self.frame_id = frame_id;
        self.hands.clear();
        self.fingertips.clear();
        self.lengths.clear();
    }
}

/// Gesture-to-volume mapper: six per-frame stages registered onto the frame
/// loop in fixed order (detect, extract, draw, measure, apply, reset).
///
/// Only hand id 0 drives the endpoint; further hands are measured but have
/// no audible effect.
pub struct VolumePipeline {
    source: Rc<RefCell<HandLandmarkSource>>,
    endpoint: Rc<RefCell<dyn EndpointVolume>>,
    min_length: f32,
    max_length: f32,
    draw_landmarks: bool,
}

impl VolumePipeline {
    /// new wires the landmark source and the audio endpoint to the mapping
    /// bounds.
    ///
    /// # Arguments
    /// * `source` - per-frame hand landmark facade
    /// * `endpoint` - master volume control, range already resolved
    /// * `config` - mapping domain and overlay toggle
    pub fn new(
        source: HandLandmarkSource,
        endpoint: impl EndpointVolume + 'static,
        config: VolumeControlConfig,
    ) -> Self {
        VolumePipeline {
            source: Rc::new(RefCell::new(source)),
            endpoint: Rc::new(RefCell::new(endpoint)),
            min_length: config.min_length,
            max_length: config.max_length,
            draw_landmarks: config.draw_landmarks,
        }
    }

    /// register appends the pipeline stages to the loop in their fixed
    /// order.
    pub fn register(&self, video: &mut VideoLoop<FrameContext>) {
        let source = Rc::clone(&self.source);
        let draw = self.draw_landmarks;
        video.add_callback(Box::new(move |frame, ctx| {
            let mut source = source.borrow_mut();
            source.detect(frame, draw, ctx.frame_id)?;
            ctx.hands = source.hands_for(ctx.frame_id).cloned().unwrap_or_default();
            Ok(())
        }));

        video.add_callback(Box::new(|frame, ctx| extract_fingertips(frame, ctx)));
        video.add_callback(Box::new(|frame, ctx| draw_connecting_lines(frame, ctx)));
        video.add_callback(Box::new(|_frame, ctx| {
            measure_lengths(ctx);
            Ok(())
        }));

        let endpoint = Rc::clone(&self.endpoint);
        let (min_length, max_length) = (self.min_length, self.max_length);
        video.add_callback(Box::new(move |frame, ctx| {
            apply_volume(frame, ctx, &mut *endpoint.borrow_mut(), min_length, max_length)
        }));

        let source = Rc::clone(&self.source);
        video.add_callback(Box::new(move |_frame, _ctx| {
            source.borrow_mut().clear();
            Ok(())
        }));
    }
}

/// extract_fingertips pulls thumb tip and index fingertip of every hand
/// into the context and marks both points on the frame.
pub fn extract_fingertips(frame: &mut Mat, ctx: &mut FrameContext) -> Result<(), Error> {
    for (hand_id, landmarks) in &ctx.hands {
        let mut thumb: Option<Coordinate2D> = None;
        let mut index: Option<Coordinate2D> = None;

        for lm in landmarks {
            if lm.id != THUMB_TIP && lm.id != INDEX_FINGER_TIP {
                continue;
            }
            imgproc::circle(
                frame,
                Point::new(lm.x, lm.y),
                MARKER_RADIUS,
                marker_color(),
                imgproc::FILLED,
                imgproc::LINE_8,
                0,
            )?;
            if lm.id == THUMB_TIP {
                thumb = Some(lm.coordinate());
            } else {
                index = Some(lm.coordinate());
            }
        }

        if let (Some(thumb), Some(index)) = (thumb, index) {
            ctx.fingertips.insert(*hand_id, FingertipPair { thumb, index });
        }
    }
    Ok(())
}

/// draw_connecting_lines joins each fingertip pair. Frames whose landmark
/// set is empty are skipped so a vanished hand leaves no leftover line.
pub fn draw_connecting_lines(frame: &mut Mat, ctx: &FrameContext) -> Result<(), Error> {
    if ctx.hands.is_empty() {
        return Ok(());
    }
    for pair in ctx.fingertips.values() {
        imgproc::line(
            frame,
            Point::new(pair.thumb.x, pair.thumb.y),
            Point::new(pair.index.x, pair.index.y),
            marker_color(),
            2,
            imgproc::LINE_8,
            0,
        )?;
    }
    Ok(())
}

/// measure_lengths computes the Euclidean distance of each fingertip pair.
pub fn measure_lengths(ctx: &mut FrameContext) {
    ctx.lengths.clear();
    for (hand_id, pair) in &ctx.fingertips {
        ctx.lengths
            .insert(*hand_id, euclidean_distance(pair.thumb, pair.index));
    }
}

/// apply_volume maps hand 0's fingertip distance onto the endpoint volume
/// range, pushes it to the endpoint, and draws the percentage feedback bar.
///
/// The volume is rounded to two decimals before it is applied; the bar
/// percentage is interpolated from that rounded volume rather than from the
/// raw distance, and the bar top pixel from the percentage.
pub fn apply_volume(
    frame: &mut Mat,
    ctx: &FrameContext,
    endpoint: &mut dyn EndpointVolume,
    min_length: f32,
    max_length: f32,
) -> Result<(), Error> {
    let length = match ctx.lengths.get(&0) {
        None => return Ok(()),
        Some(length) => *length,
    };

    let (min_vol, max_vol) = endpoint.volume_range();
    let volume = round2(interp(length, (min_length, max_length), (min_vol, max_vol)));
    let percentage = interp(volume, (min_vol, max_vol), (0.0, 100.0));
    let bar = bar_top(percentage);

    imgproc::rectangle(
        frame,
        Rect::new(BAR_LEFT, BAR_TOP, BAR_RIGHT - BAR_LEFT, BAR_BOTTOM - BAR_TOP),
        bar_color(),
        3,
        imgproc::LINE_8,
        0,
    )?;
    if bar < BAR_BOTTOM {
        imgproc::rectangle(
            frame,
            Rect::new(BAR_LEFT, bar, BAR_RIGHT - BAR_LEFT, BAR_BOTTOM - bar),
            bar_color(),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
    }
    imgproc::put_text(
        frame,
        &format!("{}%", percentage as i32),
        Point::new(BAR_TEXT_POS.0, BAR_TEXT_POS.1),
        imgproc::FONT_HERSHEY_COMPLEX,
        1.0,
        bar_color(),
        2,
        imgproc::LINE_8,
        false,
    )?;

    endpoint.set_master_volume(volume)
}

/// bar_top converts a volume percentage into the top pixel of the feedback
/// bar.
pub(crate) fn bar_top(percentage: f32) -> i32 {
    interp(percentage, (0.0, 100.0), (BAR_BOTTOM as f32, BAR_TOP as f32)) as i32
}

fn marker_color() -> Scalar {
    Scalar::new(255.0, 0.0, 255.0, 0.0)
}

fn bar_color() -> Scalar {
    Scalar::new(255.0, 0.0, 0.0, 0.0)
}

#[cfg(test)]
mod tests {
    use opencv::core::{Mat, MatTraitConst, Scalar, Vec3b, CV_8UC3};

    use super::*;
    use crate::utils::coordinate::LANDMARKS_PER_HAND;

    struct RecordingEndpoint {
        range: (f32, f32),
        written: Vec<f32>,
    }

    impl RecordingEndpoint {
        fn new(range: (f32, f32)) -> Self {
            RecordingEndpoint {
                range,
                written: Vec::new(),
            }
        }
    }

    impl EndpointVolume for RecordingEndpoint {
        fn volume_range(&self) -> (f32, f32) {
            self.range
        }

        fn set_master_volume(&mut self, level: f32) -> Result<(), Error> {
            self.written.push(level);
            Ok(())
        }
    }

    fn test_frame() -> Mat {
        Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn hand_with_tips(thumb: (i32, i32), index: (i32, i32)) -> Vec<HandLandmark> {
        (0..LANDMARKS_PER_HAND)
            .map(|id| {
                let (x, y) = match id {
                    THUMB_TIP => thumb,
                    INDEX_FINGER_TIP => index,
                    _ => (0, 0),
                };
                HandLandmark { id, x, y }
            })
            .collect()
    }

    #[test]
    fn test_extract_pulls_thumb_and_index() {
        let mut frame = test_frame();
        let mut ctx = FrameContext::default();
        ctx.hands.insert(0, hand_with_tips((100, 120), (200, 240)));

        extract_fingertips(&mut frame, &mut ctx).unwrap();

        let pair = ctx.fingertips.get(&0).unwrap();
        assert_eq!(pair.thumb, Coordinate2D { x: 100, y: 120 });
        assert_eq!(pair.index, Coordinate2D { x: 200, y: 240 });

        // marker circle is drawn at the thumb tip
        let pixel = frame.at_2d::<Vec3b>(120, 100).unwrap();
        assert_ne!(*pixel, Vec3b::from([0, 0, 0]));
    }

    #[test]
    fn test_extract_noop_without_hands() {
        let mut frame = test_frame();
        let mut ctx = FrameContext::default();
        extract_fingertips(&mut frame, &mut ctx).unwrap();
        assert!(ctx.fingertips.is_empty());
    }

    #[test]
    fn test_measure_is_euclidean() {
        let mut ctx = FrameContext::default();
        ctx.fingertips.insert(
            0,
            FingertipPair {
                thumb: Coordinate2D { x: 0, y: 0 },
                index: Coordinate2D { x: 3, y: 4 },
            },
        );

        measure_lengths(&mut ctx);
        assert_eq!(ctx.lengths.get(&0), Some(&5.0));
    }

    #[test]
    fn test_draw_skips_stale_fingertips() {
        let mut frame = test_frame();
        let mut ctx = FrameContext::default();
        // fingertips left over while the landmark set is empty
        ctx.fingertips.insert(
            0,
            FingertipPair {
                thumb: Coordinate2D { x: 100, y: 100 },
                index: Coordinate2D { x: 200, y: 200 },
            },
        );

        draw_connecting_lines(&mut frame, &ctx).unwrap();

        let midpoint = frame.at_2d::<Vec3b>(150, 150).unwrap();
        assert_eq!(*midpoint, Vec3b::from([0, 0, 0]));
    }

    #[test]
    fn test_apply_at_domain_bounds() {
        let mut frame = test_frame();
        let mut endpoint = RecordingEndpoint::new((-65.25, 0.0));

        let mut ctx = FrameContext::default();
        ctx.lengths.insert(0, 35.0);
        apply_volume(&mut frame, &ctx, &mut endpoint, 35.0, 300.0).unwrap();

        ctx.lengths.insert(0, 300.0);
        apply_volume(&mut frame, &ctx, &mut endpoint, 35.0, 300.0).unwrap();

        assert_eq!(endpoint.written, vec![-65.25, 0.0]);
    }

    #[test]
    fn test_apply_clamps_outside_domain() {
        let mut frame = test_frame();
        let mut endpoint = RecordingEndpoint::new((-65.25, 0.0));

        let mut ctx = FrameContext::default();
        ctx.lengths.insert(0, 10.0);
        apply_volume(&mut frame, &ctx, &mut endpoint, 35.0, 300.0).unwrap();

        ctx.lengths.insert(0, 450.0);
        apply_volume(&mut frame, &ctx, &mut endpoint, 35.0, 300.0).unwrap();

        assert_eq!(endpoint.written, vec![-65.25, 0.0]);
    }

    #[test]
    fn test_apply_rounds_to_two_decimals() {
        let mut frame = test_frame();
        let mut endpoint = RecordingEndpoint::new((-65.25, 0.0));

        let mut ctx = FrameContext::default();
        ctx.lengths.insert(0, 123.0);
        apply_volume(&mut frame, &ctx, &mut endpoint, 35.0, 300.0).unwrap();

        let expected = round2(interp(123.0, (35.0, 300.0), (-65.25, 0.0)));
        assert_eq!(endpoint.written, vec![expected]);
        assert_eq!(expected, (expected * 100.0).round() / 100.0);
    }

    #[test]
    fn test_apply_noop_without_hands() {
        let mut frame = test_frame();
        let mut endpoint = RecordingEndpoint::new((0.0, 65536.0));

        let ctx = FrameContext::default();
        apply_volume(&mut frame, &ctx, &mut endpoint, 35.0, 300.0).unwrap();

        assert!(endpoint.written.is_empty());
    }

    #[test]
    fn test_apply_first_hand_drives_volume() {
        let mut frame = test_frame();
        let mut endpoint = RecordingEndpoint::new((0.0, 100.0));

        let mut ctx = FrameContext::default();
        ctx.lengths.insert(0, 35.0);
        ctx.lengths.insert(1, 300.0);
        apply_volume(&mut frame, &ctx, &mut endpoint, 35.0, 300.0).unwrap();

        assert_eq!(endpoint.written, vec![0.0]);
    }

    #[test]
    fn test_apply_fills_bar_at_full_volume() {
        let mut frame = test_frame();
        let mut endpoint = RecordingEndpoint::new((0.0, 100.0));

        let mut ctx = FrameContext::default();
        ctx.lengths.insert(0, 300.0);
        apply_volume(&mut frame, &ctx, &mut endpoint, 35.0, 300.0).unwrap();

        // the filled bar reaches its topmost extent at 100%
        let inside = frame.at_2d::<Vec3b>(200, 60).unwrap();
        assert_eq!(*inside, Vec3b::from([255, 0, 0]));
    }

    #[test]
    fn test_bar_top_bounds_and_monotonic() {
        assert_eq!(bar_top(0.0), 400);
        assert_eq!(bar_top(50.0), 275);
        assert_eq!(bar_top(100.0), 150);

        let mut previous = bar_top(0.0);
        for pct in 1..=100 {
            let current = bar_top(pct as f32);
            assert!(current <= previous);
            previous = current;
        }
    }

    #[test]
    fn test_context_begin_clears_per_frame_maps() {
        let mut ctx = FrameContext::default();
        ctx.hands.insert(0, hand_with_tips((1, 1), (2, 2)));
        ctx.fingertips.insert(
            0,
            FingertipPair {
                thumb: Coordinate2D { x: 1, y: 1 },
                index: Coordinate2D { x: 2, y: 2 },
            },
        );
        ctx.lengths.insert(0, 1.4);

        ctx.begin(9);

        assert_eq!(ctx.frame_id, 9);
        assert!(ctx.hands.is_empty());
        assert!(ctx.fingertips.is_empty());
        assert!(ctx.lengths.is_empty());
    }

    #[test]
    fn test_empty_frame_after_detection_resets_fingertips() {
        let mut frame = test_frame();
        let mut endpoint = RecordingEndpoint::new((0.0, 100.0));
        let mut ctx = FrameContext::default();

        // frame 0: one hand detected end to end
        ctx.begin(0);
        ctx.hands.insert(0, hand_with_tips((0, 0), (100, 0)));
        extract_fingertips(&mut frame, &mut ctx).unwrap();
        measure_lengths(&mut ctx);
        apply_volume(&mut frame, &ctx, &mut endpoint, 35.0, 300.0).unwrap();
        assert_eq!(endpoint.written.len(), 1);

        // frame 1: nothing detected, nothing may survive from frame 0
        ctx.begin(1);
        extract_fingertips(&mut frame, &mut ctx).unwrap();
        measure_lengths(&mut ctx);
        apply_volume(&mut frame, &ctx, &mut endpoint, 35.0, 300.0).unwrap();

        assert!(ctx.fingertips.is_empty());
        assert!(ctx.lengths.is_empty());
        assert_eq!(endpoint.written.len(), 1);
    }
}
