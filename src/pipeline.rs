//! One processing cycle: envelope → decode → pose → metric → HUD → encode.
//!
//! Everything here is synchronous CPU work; the session loop runs it on the
//! blocking pool.

use std::sync::{Mutex, PoisonError};

use opencv::core::Mat;
use opencv::prelude::*;

use crate::codec::FrameCodec;
use crate::config::Config;
use crate::error::CycleError;
use crate::pose::{Pose, PoseEstimator};
use crate::protocol::{IncomingFrameMessage, OutgoingFrameMessage};
use crate::render::HudRenderer;
use crate::tracker::{ChestTracker, MetricSnapshot, PhaseTransition};

/// Result of a successful cycle.
#[derive(Debug)]
pub struct CycleOutput {
    /// Session state after this cycle. Commit it only if the reply is sent.
    pub tracker: ChestTracker,
    pub reply: OutgoingFrameMessage,
    pub transition: PhaseTransition,
    /// `None` when no usable shoulders were found.
    pub snapshot: Option<MetricSnapshot>,
}

/// Shared by every session. The pose model sits behind a mutex, so
/// concurrent sessions take turns on it.
pub struct FramePipeline {
    codec: FrameCodec,
    hud: HudRenderer,
    estimator: Mutex<Box<dyn PoseEstimator>>,
}

impl FramePipeline {
    pub fn new(codec: FrameCodec, hud: HudRenderer, estimator: Box<dyn PoseEstimator>) -> Self {
        Self {
            codec,
            hud,
            estimator: Mutex::new(estimator),
        }
    }

    pub fn from_config(config: &Config, estimator: Box<dyn PoseEstimator>) -> Self {
        Self::new(
            FrameCodec::from_config(&config.codec),
            HudRenderer::from_config(&config.overlay),
            estimator,
        )
    }

    /// Runs one cycle on a copy of the session state.
    ///
    /// On error the caller keeps its previous state, so a dropped cycle never
    /// mutates the session.
    pub fn process(&self, text: &str, mut tracker: ChestTracker) -> Result<CycleOutput, CycleError> {
        let message = IncomingFrameMessage::parse(text)?;
        let bytes = message.image_bytes()?;
        let mut frame = self.codec.decode(&bytes)?;
        let pose = self.estimate(&frame)?;

        let transition = tracker.update_phase(message.phase);

        let width = frame.cols() as u32;
        let height = frame.rows() as u32;
        let shoulders = pose
            .as_ref()
            .and_then(|pose| tracker.locate_shoulders(pose, width, height));

        let snapshot = match shoulders {
            Some(shoulders) => {
                let snapshot = tracker.measure(&shoulders);
                self.hud
                    .draw(&mut frame, &shoulders, snapshot.shoulder_distance_px)
                    .map_err(CycleError::Render)?;
                Some(snapshot)
            }
            None => None,
        };

        let jpeg = self.codec.encode(&frame)?;
        let metrics = snapshot.unwrap_or_default();

        Ok(CycleOutput {
            tracker,
            reply: OutgoingFrameMessage::new(&jpeg, metrics.progress_pct, metrics.shoulder_distance_px),
            transition,
            snapshot,
        })
    }

    fn estimate(&self, frame: &Mat) -> Result<Option<Pose>, CycleError> {
        // A panic inside a previous estimate leaves the model usable.
        let mut estimator = self.estimator.lock().unwrap_or_else(PoisonError::into_inner);
        estimator.estimate(frame).map_err(CycleError::Detection)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use base64::{engine::general_purpose, Engine as _};
    use opencv::core::{Mat, Scalar, CV_8UC3};

    use crate::codec::FrameCodec;
    use crate::pose::{Keypoint, KeypointIndex, Pose, PoseEstimator};

    /// 水平な両肩だけを持つ姿勢（正規化X座標で指定）
    pub fn shoulder_pose(left_x: f32, right_x: f32) -> Pose {
        let mut keypoints = [Keypoint::new(0.5, 0.5, 0.9); KeypointIndex::COUNT];
        keypoints[KeypointIndex::LeftShoulder as usize] = Keypoint::new(left_x, 0.5, 0.9);
        keypoints[KeypointIndex::RightShoulder as usize] = Keypoint::new(right_x, 0.5, 0.9);
        Pose::new(keypoints)
    }

    /// 左肩 0.25 / 右肩 0.5625 → 肩幅 = 幅 * 0.3125 ピクセル
    pub fn standard_pose() -> Pose {
        shoulder_pose(0.25, 0.5625)
    }

    pub fn black_jpeg(width: i32, height: i32) -> Vec<u8> {
        let frame = Mat::new_rows_cols_with_default(height, width, CV_8UC3, Scalar::all(0.0)).unwrap();
        FrameCodec::new(90).encode(&frame).unwrap()
    }

    /// クライアントが送る JSON テキスト
    pub fn frame_message(width: i32, height: i32, phase: i64) -> String {
        let b64 = general_purpose::STANDARD.encode(black_jpeg(width, height));
        serde_json::json!({
            "frame": format!("data:image/jpeg;base64,{}", b64),
            "phase": phase,
        })
        .to_string()
    }

    /// 毎回同じ結果を返す
    pub struct FixedEstimator(pub Option<Pose>);

    impl PoseEstimator for FixedEstimator {
        fn estimate(&mut self, _frame: &Mat) -> Result<Option<Pose>> {
            Ok(self.0.clone())
        }
    }

    /// 台本どおりに返す。台本が尽きたら人物なし
    pub struct ScriptedEstimator(pub VecDeque<Option<Pose>>);

    impl PoseEstimator for ScriptedEstimator {
        fn estimate(&mut self, _frame: &Mat) -> Result<Option<Pose>> {
            Ok(self.0.pop_front().flatten())
        }
    }

    pub struct FailingEstimator;

    impl PoseEstimator for FailingEstimator {
        fn estimate(&mut self, _frame: &Mat) -> Result<Option<Pose>> {
            Err(anyhow!("model exploded"))
        }
    }

    /// 推論に時間がかかるモデル
    pub struct SlowEstimator(pub Duration);

    impl PoseEstimator for SlowEstimator {
        fn estimate(&mut self, _frame: &Mat) -> Result<Option<Pose>> {
            std::thread::sleep(self.0);
            Ok(Some(standard_pose()))
        }
    }
}
