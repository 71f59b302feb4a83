//! 结果绘制 (Renderer)
//!
//! 把一帧的跟踪结果画到图像上, 用于离线查看:
//! - 检测框: 颜色由 `track_color(track_id)` 决定, 同一ID颜色恒定
//! - 置信度条: 框上方的实心条, 长度与置信度成正比, 颜色由行为标签决定
//! - 异常分数条: 框下方的红色实心条, 长度与异常分数成正比
//! - 已确认轨迹: 框中心画实心圆点
//! - 异常轨迹: 框外再画一圈红色边框

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detection::track_color;
use crate::detection::types::{AnnotatedDetection, Behavior, TrackId};
use crate::pipeline::FrameReport;

const BOX_THICKNESS: i32 = 3;
const BAR_HEIGHT: u32 = 4;
const CENTER_RADIUS: i32 = 3;
const ANOMALY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// 在帧上绘制检测结果
pub fn annotate(
    frame: &DynamicImage,
    detections: &[AnnotatedDetection],
    notable: &[TrackId],
) -> RgbImage {
    let mut canvas = frame.to_rgb8();
    for det in detections {
        draw_detection(&mut canvas, det, notable.contains(&det.track_id));
    }
    canvas
}

/// 在空白画布上绘制一帧报告 (没有原始图像时使用)
pub fn render_report(width: u32, height: u32, report: &FrameReport) -> RgbImage {
    let blank = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    annotate(&blank, &report.detections, &report.notable_anomalies)
}

/// 行为标签对应的置信度条颜色 (无标签时沿用轨迹颜色)
pub fn behavior_color(behavior: Behavior) -> Rgb<u8> {
    match behavior {
        Behavior::Stationary => Rgb([128, 128, 128]),
        Behavior::Moving => Rgb([0, 200, 0]),
        Behavior::Erratic => Rgb([255, 140, 0]),
        Behavior::Interacting => Rgb([0, 120, 255]),
    }
}

fn draw_detection(canvas: &mut RgbImage, det: &AnnotatedDetection, notable: bool) {
    let bbox = det.bbox;
    if !bbox.is_finite() || bbox.width() < 1.0 || bbox.height() < 1.0 {
        return;
    }

    // 坐标先收敛到画布附近, 超大坐标转整数时不会溢出
    let (cw, ch) = (canvas.width() as f32, canvas.height() as f32);
    let x1 = bbox.x1.clamp(-cw, 2.0 * cw).round();
    let y1 = bbox.y1.clamp(-ch, 2.0 * ch).round();
    let x2 = bbox.x2.clamp(-cw, 2.0 * cw).round();
    let y2 = bbox.y2.clamp(-ch, 2.0 * ch).round();
    if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
        return;
    }

    let (r, g, b) = track_color(det.track_id);
    let color = Rgb([r, g, b]);

    let x = x1 as i32;
    let y = y1 as i32;
    let w = (x2 - x1) as u32;
    let h = (y2 - y1) as u32;

    // 边框 (向内加粗)
    for i in 0..BOX_THICKNESS {
        let inset = 2 * i as u32;
        if w <= inset || h <= inset {
            break;
        }
        let rect = Rect::at(x.saturating_add(i), y.saturating_add(i))
            .of_size(w - inset, h - inset);
        draw_hollow_rect_mut(canvas, rect, color);
    }

    // 置信度条 (颜色表示行为)
    let bar = (w as f32 * det.confidence.clamp(0.0, 1.0)).round() as u32;
    if bar > 0 {
        let bar_color = det.behavior.map(behavior_color).unwrap_or(color);
        let rect = Rect::at(x, y.saturating_sub(BAR_HEIGHT as i32 + 1)).of_size(bar, BAR_HEIGHT);
        draw_filled_rect_mut(canvas, rect, bar_color);
    }

    // 异常分数条 (框下方)
    if let Some(score) = det.anomaly_score.filter(|s| s.is_finite()) {
        let len = (w as f32 * score.clamp(0.0, 1.0)).round() as u32;
        if len > 0 {
            let top = y.saturating_add(h as i32).saturating_add(1);
            let rect = Rect::at(x, top).of_size(len, BAR_HEIGHT);
            draw_filled_rect_mut(canvas, rect, ANOMALY_COLOR);
        }
    }

    if det.confirmed {
        let cx = ((x1 + x2) / 2.0).round() as i32;
        let cy = ((y1 + y2) / 2.0).round() as i32;
        draw_filled_circle_mut(canvas, (cx, cy), CENTER_RADIUS, color);
    }

    if notable {
        let rect = Rect::at(x.saturating_sub(2), y.saturating_sub(2))
            .of_size(w.saturating_add(4), h.saturating_add(4));
        draw_hollow_rect_mut(canvas, rect, ANOMALY_COLOR);
    }
}
