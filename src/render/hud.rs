use opencv::core::{Mat, Point, Scalar};
use opencv::imgproc;

use crate::config::OverlayConfig;
use crate::tracker::ShoulderPoints;

/// 肩幅テレメトリの HUD 描画
///
/// 描画順: 肩を結ぶ線 → 両肩のマーカー → 左肩の上に距離ラベル
#[derive(Debug, Clone)]
pub struct HudRenderer {
    color: Scalar,
    line_thickness: i32,
    marker_radius: i32,
    font_scale: f64,
    text_thickness: i32,
    label_offset: i32,
}

impl HudRenderer {
    pub fn from_config(config: &OverlayConfig) -> Self {
        let [b, g, r] = config.color_bgr;
        Self {
            color: Scalar::new(b as f64, g as f64, r as f64, 0.0),
            line_thickness: config.line_thickness.max(1),
            marker_radius: config.marker_radius.max(1),
            font_scale: config.font_scale,
            text_thickness: config.text_thickness.max(1),
            label_offset: config.label_offset,
        }
    }

    pub fn draw(&self, frame: &mut Mat, shoulders: &ShoulderPoints, distance_px: f32) -> opencv::Result<()> {
        let left = Point::new(shoulders.left.0, shoulders.left.1);
        let right = Point::new(shoulders.right.0, shoulders.right.1);

        imgproc::line(frame, left, right, self.color, self.line_thickness, imgproc::LINE_8, 0)?;
        for center in [left, right] {
            imgproc::circle(frame, center, self.marker_radius, self.color, imgproc::FILLED, imgproc::LINE_8, 0)?;
        }

        imgproc::put_text(
            frame,
            &distance_label(distance_px),
            Point::new(left.x, left.y - self.label_offset),
            imgproc::FONT_HERSHEY_SIMPLEX,
            self.font_scale,
            self.color,
            self.text_thickness,
            imgproc::LINE_8,
            false,
        )?;

        Ok(())
    }
}

impl Default for HudRenderer {
    fn default() -> Self {
        Self::from_config(&OverlayConfig::default())
    }
}

/// ラベル文字列（小数部は切り捨て）
pub fn distance_label(distance_px: f32) -> String {
    format!("SHOULDER_DIST: {}px", distance_px as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Vec3b, CV_8UC3};
    use opencv::prelude::*;

    fn black_frame() -> Mat {
        Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn is_hud_color(px: &Vec3b) -> bool {
        px[0] == 0 && px[1] == 255 && px[2] == 255
    }

    #[test]
    fn test_distance_label() {
        assert_eq!(distance_label(209.9), "SHOULDER_DIST: 209px");
        assert_eq!(distance_label(0.0), "SHOULDER_DIST: 0px");
    }

    #[test]
    fn test_draws_line_and_markers() {
        let renderer = HudRenderer::default();
        let mut frame = black_frame();
        let shoulders = ShoulderPoints {
            left: (160, 240),
            right: (360, 240),
        };
        renderer.draw(&mut frame, &shoulders, 200.0).unwrap();

        // 両肩のマーカー
        assert!(is_hud_color(frame.at_2d::<Vec3b>(240, 160).unwrap()));
        assert!(is_hud_color(frame.at_2d::<Vec3b>(240, 360).unwrap()));
        // マーカー半径の外側、線の上
        assert!(is_hud_color(frame.at_2d::<Vec3b>(240, 260).unwrap()));
        // 線から離れた場所は描かれない
        assert!(!is_hud_color(frame.at_2d::<Vec3b>(400, 260).unwrap()));
    }

    #[test]
    fn test_label_is_drawn_above_left_shoulder() {
        let renderer = HudRenderer::default();
        let mut frame = black_frame();
        let shoulders = ShoulderPoints {
            left: (100, 300),
            right: (400, 300),
        };
        renderer.draw(&mut frame, &shoulders, 300.0).unwrap();

        // ラベルのベースラインは y = 250。その少し上の帯に文字のピクセルがある
        let mut text_pixels = 0;
        for y in 225..250 {
            for x in 100..400 {
                if is_hud_color(frame.at_2d::<Vec3b>(y, x).unwrap()) {
                    text_pixels += 1;
                }
            }
        }
        assert!(text_pixels > 0);
    }

    #[test]
    fn test_points_outside_frame_are_clipped() {
        let renderer = HudRenderer::default();
        let mut frame = black_frame();
        let shoulders = ShoulderPoints {
            left: (-50, 10),
            right: (900, 700),
        };
        assert!(renderer.draw(&mut frame, &shoulders, 1200.0).is_ok());
    }
}
