use std::cmp::max;

use anyhow::Error;
use ndarray::{Array3, Array4, Axis};
use opencv::core::{Mat, MatTraitConst, Rect, Scalar, Size, Vec3b};
use opencv::imgproc;
use opencv::imgproc::resize;

use crate::config::config::HandDetectionConfig;
use crate::triton_client::client::triton::model_infer_request::InferInputTensor;
use crate::triton_client::client::triton::{
    InferTensorContents, ModelConfigResponse, ModelInferRequest,
};
use crate::triton_client::client::TritonInferenceClient;
use crate::utils::coordinate::{HandLandmark, LANDMARKS_PER_HAND};
use crate::utils::image::bgr_to_rgb;
use crate::utils::utils::{u8_to_f32_vec, u8_to_i32_vec};

const SCORE_OUTPUT: &str = "scores";
const LANDMARK_OUTPUT: &str = "landmarks";

/// Client for the served hand landmark model: letterboxes frames into the
/// model input tensor and scales the normalized landmark output back to
/// frame pixels.
#[derive(Debug, Clone)]
pub struct HandLandmarkClient {
    triton_infer_client: TritonInferenceClient,
    triton_model_config: ModelConfigResponse,
    model_name: String,
    timeout: i32,
    mean: f32,
    scale: f32,
    max_hands: usize,
    min_detection_confidence: f32,
}

impl HandLandmarkClient {
    pub fn new(
        triton_infer_client: TritonInferenceClient,
        triton_model_config: ModelConfigResponse,
        config: HandDetectionConfig,
    ) -> Self {
        HandLandmarkClient {
            triton_infer_client,
            triton_model_config,
            model_name: config.model_name,
            timeout: config.timeout,
            mean: config.mean,
            scale: config.scale,
            max_hands: config.max_hands,
            min_detection_confidence: config.min_detection_confidence,
        }
    }

    /// preprocess converts the BGR frame to RGB, letterboxes it into the
    /// model input square and normalizes pixel values.
    ///
    /// # Arguments
    /// * `frame` - OpenCV matrix in BGR layout
    ///
    /// # Returns
    /// * NCHW input tensor and the factor mapping normalized model
    ///   coordinates back to frame pixels
    fn preprocess(&self, frame: &Mat) -> Result<(Array4<f32>, f32), Error> {
        let model_config = match self.triton_model_config.clone().config {
            None => {
                return Err(Error::msg(
                    "hand_landmark_client - hand landmark model config is empty",
                ))
            }
            Some(model_config) => model_config,
        };

        if model_config.input.is_empty() {
            return Err(Error::msg(
                "hand_landmark_client - model config declares no input",
            ));
        }
        let input_shape = &model_config.input[0].dims;
        if input_shape.len() != 3 {
            return Err(Error::msg(
                "hand_landmark_client - expected CHW input dimensions",
            ));
        }

        let rgb = bgr_to_rgb(frame)?;
        let img_h = rgb.rows();
        let img_w = rgb.cols();

        let (new_width, new_height) = letterbox_dims(
            img_w,
            img_h,
            input_shape[2] as i32,
            input_shape[1] as i32,
        );

        let mut img_resized = Mat::default();
        resize(
            &rgb,
            &mut img_resized,
            Size::new(new_width, new_height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let mut img_scaled = Mat::new_rows_cols_with_default(
            input_shape[1] as i32,
            input_shape[2] as i32,
            opencv::core::CV_8UC3,
            Scalar::all(0.0),
        )?;

        {
            let mut roi = Mat::roi_mut(&mut img_scaled, Rect::new(0, 0, new_width, new_height))?;
            img_resized.copy_to(&mut roi)?;
        }

        let mut im_tensor = Array3::<f32>::zeros((
            input_shape[1] as usize,
            input_shape[2] as usize,
            input_shape[0] as usize,
        ));

        // Convert the image to float and normalize it
        for i in 0..3 {
            for y in 0..input_shape[1] as usize {
                for x in 0..input_shape[2] as usize {
                    let pixel_value = img_scaled.at_2d::<Vec3b>(y as i32, x as i32)?[i];
                    im_tensor[[y, x, i]] = (pixel_value as f32 - self.mean) * self.scale;
                }
            }
        }

        let transposed_tensors = im_tensor.permuted_axes([2, 0, 1]);
        let pixel_scale = max(img_w, img_h) as f32;

        Ok((transposed_tensors.insert_axis(Axis(0)), pixel_scale))
    }

    fn postprocess(&self, scores: &[f32], landmarks: &[f32], pixel_scale: f32) -> Vec<Vec<HandLandmark>> {
        parse_hands(
            scores,
            landmarks,
            pixel_scale,
            self.min_detection_confidence,
            self.max_hands,
        )
    }

    /// infer runs one frame through the hand landmark model.
    ///
    /// Returns the detected hands in candidate order, capped at
    /// `max_hands`, each as 21 landmarks in frame pixel coordinates.
    ///
    /// # Arguments
    /// * `frame` - OpenCV matrix in BGR layout
    ///
    /// # Returns
    /// * `Result<Vec<Vec<HandLandmark>>, Error>`
    pub async fn infer(&self, frame: &Mat) -> Result<Vec<Vec<HandLandmark>>, Error> {
        let (input_tensor, pixel_scale) = self.preprocess(frame)?;

        let model_config = match &self.triton_model_config.config {
            None => {
                return Err(Error::msg(
                    "hand_landmark_client - hand landmark model config is empty",
                ))
            }
            Some(model_config) => model_config,
        };

        let input_cfgs = &model_config.input;
        let mut input_placeholders = Vec::<InferInputTensor>::with_capacity(input_cfgs.len());

        for input_cfg in input_cfgs.iter() {
            let sub_tensor: Vec<f32> = input_tensor.clone().into_iter().collect();
            let model_input = InferInputTensor {
                name: input_cfg.name.to_string(),
                datatype: input_cfg.data_type().as_str_name()[5..].to_uppercase(),
                shape: input_tensor.shape().iter().map(|&x| x as i64).collect(),
                parameters: Default::default(),
                contents: Option::from(InferTensorContents {
                    bool_contents: vec![],
                    int_contents: vec![],
                    int64_contents: vec![],
                    uint_contents: vec![],
                    uint64_contents: vec![],
                    fp32_contents: sub_tensor,
                    fp64_contents: vec![],
                    bytes_contents: vec![],
                }),
            };
            input_placeholders.push(model_input);
        }

        let model_request = ModelInferRequest {
            model_name: self.model_name.to_owned(),
            model_version: "".to_string(),
            id: "".to_string(),
            parameters: Default::default(),
            inputs: input_placeholders,
            outputs: Default::default(),
            raw_input_contents: vec![],
        };

        let response = self.triton_infer_client.model_infer(model_request).await?;

        let mut scores: Vec<f32> = vec![];
        let mut landmarks: Vec<f32> = vec![];

        for (oidx, output) in response.outputs.iter().enumerate() {
            let raw = match response.raw_output_contents.get(oidx) {
                None => continue,
                Some(raw) => raw,
            };
            let values: Vec<f32> = match output.datatype.as_str() {
                "INT32" => u8_to_i32_vec(raw).iter().map(|&x| x as f32).collect(),
                "FP32" => u8_to_f32_vec(raw),
                _ => continue,
            };
            match output.name.as_str() {
                SCORE_OUTPUT => scores = values,
                LANDMARK_OUTPUT => landmarks = values,
                _ => {}
            }
        }

        Ok(self.postprocess(&scores, &landmarks, pixel_scale))
    }
}

/// letterbox_dims fits an image into the model input while preserving its
/// aspect ratio; the remainder of the canvas stays black.
pub(crate) fn letterbox_dims(img_w: i32, img_h: i32, model_w: i32, model_h: i32) -> (i32, i32) {
    let im_ratio = img_w as f32 / img_h as f32;
    let model_ratio = model_w as f32 / model_h as f32;

    if im_ratio > model_ratio {
        let new_width = model_w;
        let new_height = (new_width as f32 / im_ratio) as i32;
        (new_width, new_height)
    } else {
        let new_height = model_h;
        let new_width = (new_height as f32 * im_ratio) as i32;
        (new_width, new_height)
    }
}

/// parse_hands filters model candidates by detection confidence and converts
/// normalized landmark triples to pixel coordinates, keeping at most
/// `max_hands` hands.
pub(crate) fn parse_hands(
    scores: &[f32],
    landmarks: &[f32],
    pixel_scale: f32,
    min_confidence: f32,
    max_hands: usize,
) -> Vec<Vec<HandLandmark>> {
    let mut hands: Vec<Vec<HandLandmark>> = Vec::with_capacity(max_hands);

    for (candidate, score) in scores.iter().enumerate() {
        if hands.len() == max_hands {
            break;
        }
        if *score < min_confidence {
            continue;
        }

        let offset = candidate * LANDMARKS_PER_HAND * 3;
        if landmarks.len() < offset + LANDMARKS_PER_HAND * 3 {
            break;
        }

        let mut hand = Vec::with_capacity(LANDMARKS_PER_HAND);
        for id in 0..LANDMARKS_PER_HAND {
            let x = landmarks[offset + 3 * id] * pixel_scale;
            let y = landmarks[offset + 3 * id + 1] * pixel_scale;
            hand.push(HandLandmark {
                id,
                x: x as i32,
                y: y as i32,
            });
        }
        hands.push(hand);
    }

    hands
}
