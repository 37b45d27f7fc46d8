use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// 待ち受けアドレス
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// WebSocket エンドポイントのパス
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    /// debug レベルのログを出す
    #[serde(default)]
    pub verbose: bool,
    /// ログファイルの出力先ディレクトリ
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub codec: CodecConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
}

fn default_listen_addr() -> String { "0.0.0.0:8000".to_string() }
fn default_ws_path() -> String { "/ws/vision-scan".to_string() }
fn default_log_dir() -> String { "logs".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct PoseConfig {
    /// MoveNet ONNX モデルのパス
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// 人物ありと判定する平均存在スコアの下限
    #[serde(default = "default_min_pose_score")]
    pub min_pose_score: f32,
    /// キーポイントを使用可能とみなす存在スコア（これを超える必要あり）
    #[serde(default = "default_presence_threshold")]
    pub presence_threshold: f32,
}

fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }
fn default_min_pose_score() -> f32 { 0.2 }
fn default_presence_threshold() -> f32 { 0.5 }

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            min_pose_score: default_min_pose_score(),
            presence_threshold: default_presence_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// 目標とする肩幅の拡張率（ベースライン比）
    #[serde(default = "default_expansion_target")]
    pub expansion_target: f32,
    /// 最新フレームを待つドレイン窓（ミリ秒）
    #[serde(default = "default_drain_window_ms")]
    pub drain_window_ms: u64,
}

fn default_expansion_target() -> f32 { 0.07 }
fn default_drain_window_ms() -> u64 { 10 }

impl ScanConfig {
    pub fn drain_window(&self) -> Duration {
        Duration::from_millis(self.drain_window_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            expansion_target: default_expansion_target(),
            drain_window_ms: default_drain_window_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CodecConfig {
    /// 返送フレームの JPEG 品質 (1〜100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: i32,
}

fn default_jpeg_quality() -> i32 { 60 }

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// HUD の描画パラメータ（1080p 前提の太さ）
#[derive(Debug, Deserialize, Clone)]
pub struct OverlayConfig {
    /// 描画色 (B, G, R)
    #[serde(default = "default_color_bgr")]
    pub color_bgr: [u8; 3],
    #[serde(default = "default_line_thickness")]
    pub line_thickness: i32,
    #[serde(default = "default_marker_radius")]
    pub marker_radius: i32,
    #[serde(default = "default_font_scale")]
    pub font_scale: f64,
    #[serde(default = "default_text_thickness")]
    pub text_thickness: i32,
    /// ラベルを左肩から上にずらす量（ピクセル）
    #[serde(default = "default_label_offset")]
    pub label_offset: i32,
}

fn default_color_bgr() -> [u8; 3] { [0, 255, 255] }
fn default_line_thickness() -> i32 { 8 }
fn default_marker_radius() -> i32 { 16 }
fn default_font_scale() -> f64 { 1.2 }
fn default_text_thickness() -> i32 { 3 }
fn default_label_offset() -> i32 { 50 }

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            color_bgr: default_color_bgr(),
            line_thickness: default_line_thickness(),
            marker_radius: default_marker_radius(),
            font_scale: default_font_scale(),
            text_thickness: default_text_thickness(),
            label_offset: default_label_offset(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            ws_path: default_ws_path(),
            verbose: false,
            log_dir: default_log_dir(),
            pose: PoseConfig::default(),
            scan: ScanConfig::default(),
            codec: CodecConfig::default(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content)
    }

    /// ファイルが無ければデフォルト値。あるのに壊れている場合はエラー。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("invalid config")?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.codec.jpeg_quality) {
            bail!("codec.jpeg_quality must be within 1..=100, got {}", self.codec.jpeg_quality);
        }
        if !(self.scan.expansion_target > 0.0) {
            bail!("scan.expansion_target must be positive, got {}", self.scan.expansion_target);
        }
        for (name, value) in [
            ("pose.min_pose_score", self.pose.min_pose_score),
            ("pose.presence_threshold", self.pose.presence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        if !self.ws_path.starts_with('/') {
            bail!("ws_path must start with '/', got {:?}", self.ws_path);
        }
        Ok(())
    }
}
