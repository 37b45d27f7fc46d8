use anyhow::{ensure, Context, Result};
use ndarray::{Array4, ArrayViewD};
use opencv::core::Mat;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

use super::keypoint::{Keypoint, KeypointIndex, Pose};
use super::preprocess::preprocess_for_movenet;
use crate::config::PoseConfig;

/// フレームから1人分の姿勢を推定するもの
///
/// `Ok(None)` は「人物なし」で、エラーではない。
pub trait PoseEstimator: Send {
    fn estimate(&mut self, frame: &Mat) -> Result<Option<Pose>>;
}

fn build_session(model_path: &Path) -> Result<Session> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "cuda")]
    let builder = {
        tracing::info!("[ort] Attempting CUDA execution provider...");
        builder.with_execution_providers([ort::execution_providers::CUDAExecutionProvider::default().build()])?
    };

    builder
        .commit_from_file(model_path)
        .with_context(|| format!("Failed to load ONNX model {}", model_path.display()))
}

/// MoveNet (single pose) を使用した姿勢検出器
pub struct PoseDetector {
    session: Session,
    /// 平均存在スコアがこれ未満なら人物なし
    min_pose_score: f32,
}

impl PoseDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new<P: AsRef<Path>>(model_path: P, min_pose_score: f32) -> Result<Self> {
        let session = build_session(model_path.as_ref())?;
        Ok(Self { session, min_pose_score })
    }

    pub fn from_config(config: &PoseConfig) -> Result<Self> {
        Self::new(&config.model_path, config.min_pose_score)
    }

    /// 前処理済みテンソルから姿勢を検出
    ///
    /// 入力: [1, 192, 192, 3] の f32 テンソル
    /// 出力: Pose (17キーポイント)
    pub fn detect(&mut self, input: Array4<f32>) -> Result<Pose> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs!["serving_default_input_0" => input_tensor])
            .context("Inference failed")?;

        let output: ArrayViewD<f32> = outputs["StatefulPartitionedCall_0"]
            .try_extract_array()
            .context("Failed to extract output tensor")?;

        pose_from_output(&output)
    }
}

/// MoveNet の出力 [1, 1, 17, 3] (y, x, score) を Pose に変換
fn pose_from_output(output: &ArrayViewD<f32>) -> Result<Pose> {
    let expected = [1, 1, KeypointIndex::COUNT, 3];
    ensure!(
        output.shape() == &expected[..],
        "Unexpected MoveNet output shape {:?} (expected {:?})",
        output.shape(),
        expected
    );

    let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
    for (i, keypoint) in keypoints.iter_mut().enumerate() {
        let y = output[[0, 0, i, 0]];
        let x = output[[0, 0, i, 1]];
        let presence = output[[0, 0, i, 2]];
        *keypoint = Keypoint::new(x, y, presence);
    }

    Ok(Pose::new(keypoints))
}

impl PoseEstimator for PoseDetector {
    fn estimate(&mut self, frame: &Mat) -> Result<Option<Pose>> {
        let input = preprocess_for_movenet(frame)?;
        let pose = self.detect(input)?;
        Ok(accept_pose(pose, self.min_pose_score))
    }
}

/// 平均存在スコアが低すぎる推定結果は「人物なし」として捨てる
fn accept_pose(pose: Pose, min_pose_score: f32) -> Option<Pose> {
    if pose.mean_presence() >= min_pose_score {
        Some(pose)
    } else {
        None
    }
}
