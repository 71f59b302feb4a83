//! 检测器接口 (Detector)
//! 职责: 图像帧 → 原始检测框 (类别名 + 置信度)
//!
//! 真实模型 (YOLO等) 不在本crate内, 调用方实现此trait注入即可。

use std::collections::VecDeque;

use image::DynamicImage;

use crate::detection::types::Detection;
use crate::error::{PipelineError, Result};

/// 检测器统一接口
///
/// 结果顺序无意义, 可以为空。返回错误时流水线按"本帧无检测"处理。
pub trait Detector: Send {
    fn detect(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>>;

    /// 检测器名称 (日志用)
    fn name(&self) -> &str {
        "detector"
    }
}

/// 回放检测器: 按顺序返回预先录制的每帧检测结果
#[derive(Clone, Debug, Default)]
pub struct ReplayDetector {
    frames: VecDeque<Vec<Detection>>,
}

impl ReplayDetector {
    pub fn new(frames: impl IntoIterator<Item = Vec<Detection>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// 追加一帧的检测结果
    pub fn push(&mut self, detections: Vec<Detection>) {
        self.frames.push_back(detections);
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, _frame: &DynamicImage) -> Result<Vec<Detection>> {
        self.frames
            .pop_front()
            .ok_or_else(|| PipelineError::Detector("回放数据已耗尽".into()))
    }

    fn name(&self) -> &str {
        "replay"
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &DynamicImage) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// 同类非极大值抑制 (检测器实现使用, 阈值即配置里的 iou_threshold)
///
/// 按置信度降序保留, 与已保留的同类框 IoU 超过阈值的框被丢弃。
pub fn non_max_suppression(detections: &mut Vec<Detection>, iou_threshold: f32) {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut current_index = 0;
    for index in 0..detections.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let (prev, cur) = (&detections[prev_index], &detections[index]);
            if prev.class_name == cur.class_name && prev.bbox.iou(&cur.bbox) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            detections.swap(current_index, index);
            current_index += 1;
        }
    }
    detections.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::BBox;
    use image::RgbImage;

    #[test]
    fn test_replay_in_order_then_exhausted() {
        let frame = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        let det = Detection::new(BBox::new(0.0, 0.0, 1.0, 1.0), "person", 0.9);
        let mut replay = ReplayDetector::new(vec![vec![det.clone()], vec![]]);
        assert_eq!(replay.remaining(), 2);
        assert_eq!(replay.detect(&frame).unwrap(), vec![det]);
        assert!(replay.detect(&frame).unwrap().is_empty());
        assert!(matches!(replay.detect(&frame), Err(PipelineError::Detector(_))));
    }

    #[test]
    fn test_nms_same_class_only() {
        let mut dets = vec![
            Detection::new(BBox::new(0.0, 0.0, 10.0, 10.0), "person", 0.6),
            Detection::new(BBox::new(1.0, 0.0, 11.0, 10.0), "person", 0.9),
            Detection::new(BBox::new(1.0, 0.0, 11.0, 10.0), "car", 0.5),
            Detection::new(BBox::new(50.0, 50.0, 60.0, 60.0), "person", 0.4),
        ];
        non_max_suppression(&mut dets, 0.5);
        let kept: Vec<(&str, f32)> = dets
            .iter()
            .map(|d| (d.class_name.as_str(), d.confidence))
            .collect();
        assert_eq!(kept, vec![("person", 0.9), ("car", 0.5), ("person", 0.4)]);
    }
}
