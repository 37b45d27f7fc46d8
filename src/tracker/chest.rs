use crate::pose::Pose;

/// クライアントが送ってくる計測フェーズ番号
pub const MEASURING_PHASE: i64 = 1;

/// 計測状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// phase != 1
    Idle,
    /// phase == 1（キャリブレーション + 計測）
    Measuring,
}

/// `update_phase` で起きた遷移
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTransition {
    /// Idle → Measuring。ベースラインはリセット済み
    Entered,
    /// Measuring → Idle
    Exited,
    Unchanged,
}

/// 1フレーム分の計測結果（保存しない）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricSnapshot {
    /// 左右の肩の距離（ピクセル）
    pub shoulder_distance_px: f32,
    /// 目標拡張に対する達成率 (0〜100)
    pub progress_pct: f32,
}

/// 肩のピクセル座標 (左肩, 右肩)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShoulderPoints {
    pub left: (i32, i32),
    pub right: (i32, i32),
}

impl ShoulderPoints {
    pub fn distance(&self) -> f32 {
        let dx = (self.left.0 - self.right.0) as f32;
        let dy = (self.left.1 - self.right.1) as f32;
        dx.hypot(dy)
    }
}

/// 胸郭拡張トラッカー（セッションごとの状態）
///
/// ベースライン = 計測フェーズ中に観測した最小の肩幅（最も縮んだ姿勢）。
/// 計測フェーズに入るたびに 0 に戻り、最初の有効フレームで初期化される。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChestTracker {
    /// 0 = 未キャリブレーション
    baseline_distance: f32,
    phase: ScanPhase,
    /// 目標拡張率（ベースライン比）
    expansion_target: f32,
    /// 肩キーポイントの存在スコア閾値
    presence_threshold: f32,
}

impl ChestTracker {
    pub fn new(expansion_target: f32, presence_threshold: f32) -> Self {
        Self {
            baseline_distance: 0.0,
            phase: ScanPhase::Idle,
            expansion_target,
            presence_threshold,
        }
    }

    pub fn baseline_distance(&self) -> f32 {
        self.baseline_distance
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    /// クライアントのフェーズ番号で状態を進める。計測より前に毎フレーム呼ぶこと。
    ///
    /// ベースラインがリセットされるのは Idle → Measuring の立ち上がりだけ。
    pub fn update_phase(&mut self, client_phase: i64) -> PhaseTransition {
        match (self.phase, client_phase == MEASURING_PHASE) {
            (ScanPhase::Idle, true) => {
                self.baseline_distance = 0.0;
                self.phase = ScanPhase::Measuring;
                PhaseTransition::Entered
            }
            (ScanPhase::Measuring, false) => {
                self.phase = ScanPhase::Idle;
                PhaseTransition::Exited
            }
            _ => PhaseTransition::Unchanged,
        }
    }

    /// 姿勢から両肩のピクセル座標を得る。どちらかの肩が使えなければ None
    pub fn locate_shoulders(&self, pose: &Pose, width: u32, height: u32) -> Option<ShoulderPoints> {
        let (left, right) = pose.shoulders(self.presence_threshold)?;
        Some(ShoulderPoints {
            left: left.to_pixel(width, height),
            right: right.to_pixel(width, height),
        })
    }

    /// 肩幅からベースラインを更新し、達成率を計算
    pub fn measure(&mut self, shoulders: &ShoulderPoints) -> MetricSnapshot {
        let distance = shoulders.distance();

        if self.baseline_distance == 0.0 || distance < self.baseline_distance {
            self.baseline_distance = distance;
        }

        let progress_pct = if self.phase == ScanPhase::Measuring && self.baseline_distance > 0.0 {
            let expansion = (distance - self.baseline_distance).max(0.0);
            let target = self.baseline_distance * self.expansion_target;
            if target > 0.0 {
                (expansion / target * 100.0).min(100.0)
            } else {
                0.0
            }
        } else {
            0.0
        };

        MetricSnapshot {
            shoulder_distance_px: distance,
            progress_pct,
        }
    }
}
