//! 时序一致性过滤
//! Temporal consistency filter
//!
//! 低置信度检测只有在最近几帧出现过同类且位置相近 (IoU > 0.3) 的检测时才放行,
//! 此时阈值放宽为 `conf_threshold * 0.8`。

use std::collections::VecDeque;

use super::types::Detection;

/// 历史佐证所需的最小IoU (固定值, 与检测器NMS的iou_threshold无关)
pub const CORROBORATION_IOU: f32 = 0.3;

/// 佐证成立时的阈值系数
pub const CORROBORATED_FACTOR: f32 = 0.8;

/// 最近N帧已接受的检测
#[derive(Clone, Debug)]
pub struct FrameHistory {
    frames: VecDeque<Vec<Detection>>,
    capacity: usize,
}

impl FrameHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
        }
    }

    /// 追加一帧, 超出容量时丢弃最旧的一帧
    pub fn push(&mut self, detections: Vec<Detection>) {
        self.frames.push_back(detections);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.frames.iter().flatten()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// 时序一致性过滤器
#[derive(Clone, Debug)]
pub struct TemporalConsistencyFilter {
    conf_threshold: f32,
    history: FrameHistory,
}

impl TemporalConsistencyFilter {
    pub fn new(conf_threshold: f32, history_size: usize) -> Self {
        Self {
            conf_threshold,
            history: FrameHistory::new(history_size),
        }
    }

    /// 判断候选检测是否放行 (纯函数, 不修改历史)
    pub fn accepts(&self, candidate: &Detection) -> bool {
        if self.corroborated(candidate) {
            candidate.confidence > self.conf_threshold * CORROBORATED_FACTOR
        } else {
            candidate.confidence > self.conf_threshold
        }
    }

    /// 历史中是否存在同类且 IoU > 0.3 的检测
    pub fn corroborated(&self, candidate: &Detection) -> bool {
        if self.history.is_empty() {
            return false;
        }
        self.history.iter().any(|prev| {
            prev.class_name == candidate.class_name
                && prev.bbox.iou(&candidate.bbox) > CORROBORATION_IOU
        })
    }

    /// 过滤一帧的候选检测 (保持输入顺序)
    pub fn filter(&self, candidates: Vec<Detection>) -> Vec<Detection> {
        candidates.into_iter().filter(|d| self.accepts(d)).collect()
    }

    /// 记录本帧已接受的检测 (空帧也记录)
    pub fn record_frame(&mut self, accepted: Vec<Detection>) {
        self.history.push(accepted);
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    pub fn reset(&mut self) {
        self.history.clear();
    }
}
