use anyhow::{ensure, Result};
use ndarray::Array4;
use opencv::{
    core::{AlgorithmHint, Mat, Size, Vec3f, CV_32FC3},
    imgproc,
    prelude::*,
};

/// MoveNet用の入力サイズ
pub const MOVENET_INPUT_SIZE: i32 = 192;

/// BGR フレームを MoveNet 用の入力テンソルに変換
///
/// - BGR -> RGB
/// - 192x192 に引き伸ばし（レターボックスなし。出力座標はそのまま元フレームの正規化座標になる）
/// - [1, 192, 192, 3] の f32 テンソル (0.0-255.0)
pub fn preprocess_for_movenet(frame: &Mat) -> Result<Array4<f32>> {
    ensure!(!frame.empty(), "empty frame");

    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb,
        &mut resized,
        Size::new(MOVENET_INPUT_SIZE, MOVENET_INPUT_SIZE),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut float_mat = Mat::default();
    resized.convert_to(&mut float_mat, CV_32FC3, 1.0, 0.0)?;

    let s = MOVENET_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, s, s, 3));
    for y in 0..s {
        let row = float_mat.at_row::<Vec3f>(y as i32)?;
        for (x, pixel) in row.iter().enumerate() {
            for c in 0..3 {
                tensor[[0, y, x, c]] = pixel[c];
            }
        }
    }

    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_preprocess_shape_and_channel_order() {
        // BGR = (10, 20, 30) → RGB = (30, 20, 10)
        let frame =
            Mat::new_rows_cols_with_default(1080, 1920, CV_8UC3, Scalar::new(10.0, 20.0, 30.0, 0.0)).unwrap();
        let tensor = preprocess_for_movenet(&frame).unwrap();

        assert_eq!(tensor.shape(), &[1, 192, 192, 3]);
        assert!((tensor[[0, 96, 96, 0]] - 30.0).abs() < 0.5);
        assert!((tensor[[0, 96, 96, 1]] - 20.0).abs() < 0.5);
        assert!((tensor[[0, 96, 96, 2]] - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_preprocess_empty_frame() {
        assert!(preprocess_for_movenet(&Mat::default()).is_err());
    }
}
