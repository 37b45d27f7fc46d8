use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use vision_scan::config::Config;
use vision_scan::pipeline::FramePipeline;
use vision_scan::pose::PoseDetector;
use vision_scan::{logging, server};

/// 胸郭拡張スキャン用 WebSocket サーバー
#[derive(Parser, Debug)]
#[command(version = env!("GIT_VERSION"))]
struct Args {
    /// 設定ファイル（無ければデフォルト値）
    #[arg(short, long, default_value = "vision_server.toml")]
    config: String,

    /// 待ち受けアドレス (例: 0.0.0.0:8000)
    #[arg(short, long)]
    listen: Option<String>,

    /// 姿勢推定モデル (ONNX)
    #[arg(short, long)]
    model: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("failed to load {}", args.config))?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(model) = args.model {
        config.pose.model_path = model;
    }
    config.verbose |= args.verbose;
    config.validate()?;

    let log_path = logging::init(Path::new(&config.log_dir), config.verbose)?;

    info!("Vision Scan Server ({})", env!("GIT_VERSION"));
    info!("Log: {}", log_path.display());
    info!("Config: {}", args.config);
    info!("Listen: {}{}", config.listen_addr, config.ws_path);
    info!("Model: {}", config.pose.model_path);
    info!(
        "Scan: target={:.0}% drain={}ms jpeg_quality={}",
        config.scan.expansion_target * 100.0,
        config.scan.drain_window_ms,
        config.codec.jpeg_quality
    );
    if config.verbose {
        info!("Verbose mode: ON");
    }

    let detector = PoseDetector::from_config(&config.pose)?;
    info!("Pose model loaded");

    let pipeline = Arc::new(FramePipeline::from_config(&config, Box::new(detector)));
    server::serve(&config, pipeline).await
}
