use anyhow::Error;
use opencv::core::Mat;
use opencv::imgproc::{cvt_color, COLOR_BGR2RGB};

/// bgr_to_rgb converts a capture-device BGR frame to the RGB channel order
/// the landmark model was trained on.
///
/// # Arguments
/// * `frame` - OpenCV matrix in BGR layout
///
/// # Returns
/// * `Result<Mat, Error>`
pub fn bgr_to_rgb(frame: &Mat) -> Result<Mat, Error> {
    let mut rgb = Mat::default();
    match cvt_color(frame, &mut rgb, COLOR_BGR2RGB, 0) {
        Ok(_) => {}
        Err(e) => return Err(Error::from(e)),
    };
    Ok(rgb)
}
