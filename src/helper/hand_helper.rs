use std::collections::BTreeMap;

use anyhow::Error;
use opencv::core::{Mat, Point, Scalar};
use opencv::imgproc;
use tokio::runtime::Handle;

use crate::modules::hand_landmark_client::HandLandmarkClient;
use crate::utils::coordinate::{HandLandmark, HAND_CONNECTIONS};

const KEYPOINT_RADIUS: i32 = 4;

/// Hands detected in one frame, keyed by hand id in candidate order. Hand
/// ids are only meaningful within that frame.
pub type HandMap = BTreeMap<usize, Vec<HandLandmark>>;

/// One detection result, tagged with the frame it belongs to.
#[derive(Debug, Clone)]
pub struct Detection {
    pub frame_id: u64,
    pub hands: HandMap,
}

/// Per-frame landmark facade over the model client.
///
/// Stores at most one detection at a time. Consumers read it through
/// [`HandLandmarkSource::hands_for`], which only yields a result tagged
/// with the requested frame, and the pipeline discards it every frame via
/// [`HandLandmarkSource::clear`] so a vanished hand cannot leak geometry
/// into later frames.
pub struct HandLandmarkSource {
    client: HandLandmarkClient,
    rt: Handle,
    last_detection: Option<Detection>,
}

impl HandLandmarkSource {
    /// new initializes the source; `rt` drives the async inference client
    /// to completion, one call at a time.
    pub fn new(client: HandLandmarkClient, rt: Handle) -> Self {
        HandLandmarkSource {
            client,
            rt,
            last_detection: None,
        }
    }

    /// detect runs the landmark model on the frame and stores the result.
    ///
    /// An empty result is stored when no hand is detected; callers cannot
    /// distinguish it from "never ran", which is intended.
    ///
    /// # Arguments
    /// * `frame` - BGR frame, drawn on in place when `draw` is set
    /// * `draw` - overlay keypoints and skeleton connections
    /// * `frame_id` - loop iteration the detection belongs to
    pub fn detect(&mut self, frame: &mut Mat, draw: bool, frame_id: u64) -> Result<(), Error> {
        let detected = self.rt.block_on(self.client.infer(frame))?;

        let mut hands: HandMap = BTreeMap::new();
        for (hand_id, landmarks) in detected.into_iter().enumerate() {
            hands.insert(hand_id, landmarks);
        }

        if draw {
            draw_hand_landmarks(frame, &hands)?;
        }

        self.last_detection = Some(Detection { frame_id, hands });
        Ok(())
    }

    /// hands_for returns the stored detection only when it was produced for
    /// the given frame.
    pub fn hands_for(&self, frame_id: u64) -> Option<&HandMap> {
        current_hands(&self.last_detection, frame_id)
    }

    /// clear discards the stored detection; invoked once per frame after
    /// all consumers have read it.
    pub fn clear(&mut self) {
        self.last_detection = None;
    }
}

pub(crate) fn current_hands(last: &Option<Detection>, frame_id: u64) -> Option<&HandMap> {
    match last {
        Some(detection) if detection.frame_id == frame_id => Some(&detection.hands),
        _ => None,
    }
}

/// draw_hand_landmarks overlays keypoint circles and skeleton connections
/// on the frame in place.
pub fn draw_hand_landmarks(frame: &mut Mat, hands: &HandMap) -> Result<(), Error> {
    for landmarks in hands.values() {
        for lm in landmarks {
            imgproc::circle(
                frame,
                Point::new(lm.x, lm.y),
                KEYPOINT_RADIUS,
                Scalar::new(0.0, 0.0, 255.0, 0.0),
                imgproc::FILLED,
                imgproc::LINE_8,
                0,
            )?;
        }
        for &(a, b) in HAND_CONNECTIONS.iter() {
            if let (Some(pa), Some(pb)) = (landmarks.get(a), landmarks.get(b)) {
                imgproc::line(
                    frame,
                    Point::new(pa.x, pa.y),
                    Point::new(pb.x, pb.y),
                    Scalar::new(0.0, 255.0, 0.0, 0.0),
                    2,
                    imgproc::LINE_8,
                    0,
                )?;
            }
        }
    }
    Ok(())
}
