/// MoveNet (COCO) の 17 キーポイントインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum KeypointIndex {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl KeypointIndex {
    pub const COUNT: usize = 17;
}

/// 単一キーポイント
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Keypoint {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 存在スコア (0.0〜1.0)
    pub presence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, presence: f32) -> Self {
        Self { x, y, presence }
    }

    /// 存在スコアが閾値を超えているか（閾値ちょうどは不可）
    pub fn is_usable(&self, threshold: f32) -> bool {
        self.presence > threshold
    }

    /// ピクセル座標に変換（小数部は切り捨て）
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

/// 1人分の姿勢（17キーポイント）
#[derive(Debug, Clone, Default)]
pub struct Pose {
    pub keypoints: [Keypoint; KeypointIndex::COUNT],
}

impl Pose {
    pub fn new(keypoints: [Keypoint; KeypointIndex::COUNT]) -> Self {
        Self { keypoints }
    }

    /// インデックスでキーポイントを取得
    pub fn get(&self, index: KeypointIndex) -> &Keypoint {
        &self.keypoints[index as usize]
    }

    /// 左右の肩がどちらも使用可能なら (左肩, 右肩) を返す
    pub fn shoulders(&self, threshold: f32) -> Option<(Keypoint, Keypoint)> {
        let left = *self.get(KeypointIndex::LeftShoulder);
        let right = *self.get(KeypointIndex::RightShoulder);
        if left.is_usable(threshold) && right.is_usable(threshold) {
            Some((left, right))
        } else {
            None
        }
    }

    /// 全キーポイントの平均存在スコア
    pub fn mean_presence(&self) -> f32 {
        let sum: f32 = self.keypoints.iter().map(|k| k.presence).sum();
        sum / KeypointIndex::COUNT as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shoulder_indices() {
        assert_eq!(KeypointIndex::LeftShoulder as usize, 5);
        assert_eq!(KeypointIndex::RightShoulder as usize, 6);
    }

    #[test]
    fn test_keypoint_is_usable() {
        let kp = Keypoint::new(0.5, 0.5, 0.7);
        assert!(kp.is_usable(0.5));
        assert!(!kp.is_usable(0.8));
        // 閾値ちょうどは使用不可
        assert!(!Keypoint::new(0.5, 0.5, 0.5).is_usable(0.5));
    }

    #[test]
    fn test_keypoint_to_pixel_truncates() {
        let kp = Keypoint::new(0.5, 0.25, 1.0);
        assert_eq!(kp.to_pixel(640, 480), (320, 120));

        // 0.3333 * 1920 = 639.9 → 639
        let kp = Keypoint::new(0.3333, 0.0, 1.0);
        assert_eq!(kp.to_pixel(1920, 1080).0, 639);
    }

    #[test]
    fn test_pose_shoulders() {
        let mut keypoints = [Keypoint::default(); KeypointIndex::COUNT];
        keypoints[KeypointIndex::LeftShoulder as usize] = Keypoint::new(0.3, 0.4, 0.9);
        keypoints[KeypointIndex::RightShoulder as usize] = Keypoint::new(0.7, 0.4, 0.6);

        let pose = Pose::new(keypoints);
        let (left, right) = pose.shoulders(0.5).unwrap();
        assert_eq!(left.x, 0.3);
        assert_eq!(right.x, 0.7);

        // 片方でも閾値以下なら None
        assert!(pose.shoulders(0.6).is_none());
    }

    #[test]
    fn test_pose_mean_presence() {
        let pose = Pose::new([Keypoint::new(0.0, 0.0, 0.5); KeypointIndex::COUNT]);
        assert!((pose.mean_presence() - 0.5).abs() < 0.001);
        assert_eq!(Pose::default().mean_presence(), 0.0);
    }
}
