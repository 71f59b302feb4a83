//! 行为分析 (Behavior Analysis)
//!
//! 为每条轨迹维护位置/速度/交互历史, 历史足够长后给出行为标签:
//! - stationary: 无速度样本或平均速度低于阈值
//! - erratic:    相邻位移向量的平均夹角 > π/2
//! - interacting: 与其他轨迹发生过近距离接触
//! - moving:     其余情况
//!
//! 判定顺序固定, erratic 优先于 interacting。

use std::collections::{HashMap, VecDeque};
use std::f32::consts::FRAC_PI_2;

use crate::detection::types::{AnnotatedDetection, Behavior, TrackId};

/// 位移向量长度低于此值视为退化, 不参与夹角计算
const MIN_DISPLACEMENT: f32 = 1e-6;

/// 单条轨迹的行为历史 (各序列长度均不超过窗口)
#[derive(Clone, Debug, Default)]
pub struct BehaviorHistory {
    pub positions: VecDeque<(f32, f32)>,
    pub velocities: VecDeque<f32>,
    pub interactions: VecDeque<TrackId>,
}

impl BehaviorHistory {
    fn push_position(&mut self, position: (f32, f32), window: usize) {
        if let Some(&(px, py)) = self.positions.back() {
            let velocity = ((position.0 - px).powi(2) + (position.1 - py).powi(2)).sqrt();
            push_bounded(&mut self.velocities, velocity, window);
        }
        push_bounded(&mut self.positions, position, window);
    }

    fn push_interaction(&mut self, other: TrackId, window: usize) {
        push_bounded(&mut self.interactions, other, window);
    }

    /// 平均速度 (像素/帧)
    pub fn mean_velocity(&self) -> Option<f32> {
        mean(self.velocities.iter().copied())
    }

    /// 相邻位移向量的平均夹角 (弧度), 无有效向量对时为0
    pub fn mean_direction_change(&self) -> f32 {
        let displacements: Vec<(f32, f32)> = self
            .positions
            .iter()
            .zip(self.positions.iter().skip(1))
            .map(|(a, b)| (b.0 - a.0, b.1 - a.1))
            .collect();

        let angles = displacements.windows(2).filter_map(|pair| {
            let (v1, v2) = (pair[0], pair[1]);
            let n1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
            let n2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
            if n1 < MIN_DISPLACEMENT || n2 < MIN_DISPLACEMENT {
                return None;
            }
            let cos = (v1.0 * v2.0 + v1.1 * v2.1) / (n1 * n2);
            Some(cos.clamp(-1.0, 1.0).acos())
        });

        mean(angles).unwrap_or(0.0)
    }

    /// 位置在两个坐标轴上的总体标准差的均值
    pub fn position_spread(&self) -> f32 {
        let xs = population_std(self.positions.iter().map(|p| p.0));
        let ys = population_std(self.positions.iter().map(|p| p.1));
        (xs + ys) / 2.0
    }
}

/// 行为分析器 (一个会话独占一个实例)
#[derive(Clone, Debug)]
pub struct BehaviorAnalyzer {
    histories: HashMap<TrackId, BehaviorHistory>,
    min_frames: usize,
    velocity_threshold: f32,
    interaction_distance: f32,
    window: usize,
}

impl BehaviorAnalyzer {
    pub fn new(
        min_frames: usize,
        velocity_threshold: f32,
        interaction_distance: f32,
        window: usize,
    ) -> Self {
        Self {
            histories: HashMap::new(),
            min_frames,
            velocity_threshold,
            interaction_distance,
            window: window.max(1),
        }
    }

    /// 用本帧检测更新历史, 返回历史足够长的轨迹的行为标签
    pub fn update(&mut self, detections: &[AnnotatedDetection]) -> HashMap<TrackId, Behavior> {
        let window = self.window;

        for det in detections {
            self.histories
                .entry(det.track_id)
                .or_default()
                .push_position(det.bbox.center(), window);
        }

        // 同帧两两检查交互
        for (i, a) in detections.iter().enumerate() {
            for b in &detections[i + 1..] {
                if a.track_id == b.track_id {
                    continue;
                }
                if a.bbox.center_distance(&b.bbox) < self.interaction_distance {
                    if let Some(h) = self.histories.get_mut(&a.track_id) {
                        h.push_interaction(b.track_id, window);
                    }
                    if let Some(h) = self.histories.get_mut(&b.track_id) {
                        h.push_interaction(a.track_id, window);
                    }
                }
            }
        }

        let mut behaviors = HashMap::new();
        for det in detections {
            if let Some(behavior) = self.classify(det.track_id) {
                behaviors.insert(det.track_id, behavior);
            }
        }
        behaviors
    }

    /// 对单条轨迹分类 (位置数不足时返回 None)
    pub fn classify(&self, track_id: TrackId) -> Option<Behavior> {
        let history = self.histories.get(&track_id)?;
        if history.positions.len() < self.min_frames {
            return None;
        }

        let behavior = match history.mean_velocity() {
            None => Behavior::Stationary,
            Some(v) if v < self.velocity_threshold => Behavior::Stationary,
            Some(_) if history.mean_direction_change() > FRAC_PI_2 => Behavior::Erratic,
            Some(_) if !history.interactions.is_empty() => Behavior::Interacting,
            Some(_) => Behavior::Moving,
        };
        Some(behavior)
    }

    /// 历史是否足够进行评估
    pub fn is_qualified(&self, track_id: TrackId) -> bool {
        self.histories
            .get(&track_id)
            .map(|h| h.positions.len() >= self.min_frames)
            .unwrap_or(false)
    }

    pub fn history(&self, track_id: TrackId) -> Option<&BehaviorHistory> {
        self.histories.get(&track_id)
    }

    /// 只保留仍在跟踪的轨迹历史
    pub fn retain(&mut self, mut is_active: impl FnMut(TrackId) -> bool) {
        self.histories.retain(|id, _| is_active(*id));
    }

    pub fn remove(&mut self, track_id: TrackId) {
        self.histories.remove(&track_id);
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    pub fn reset(&mut self) {
        self.histories.clear();
    }
}

// ========== 统计工具 ==========

pub(crate) fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, capacity: usize) {
    queue.push_back(value);
    while queue.len() > capacity {
        queue.pop_front();
    }
}

pub(crate) fn mean(values: impl Iterator<Item = f32>) -> Option<f32> {
    let (sum, count) = values.fold((0.0f32, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f32)
    }
}

/// 总体标准差 (ddof=0), 空序列为0
pub(crate) fn population_std(values: impl Iterator<Item = f32> + Clone) -> f32 {
    let Some(m) = mean(values.clone()) else {
        return 0.0;
    };
    mean(values.map(|v| (v - m).powi(2)))
        .map(f32::sqrt)
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{BBox, Detection};

    fn at(track_id: TrackId, x: f32, y: f32) -> AnnotatedDetection {
        let det = Detection::new(BBox::new(x, y, x + 40.0, y + 40.0), "person", 0.9);
        AnnotatedDetection::new(det, track_id, true)
    }

    fn analyzer() -> BehaviorAnalyzer {
        BehaviorAnalyzer::new(10, 5.0, 100.0, 30)
    }

    #[test]
    fn test_needs_min_frames() {
        let mut a = analyzer();
        for frame in 0..9 {
            let out = a.update(&[at(0, 0.0, 0.0)]);
            assert!(out.is_empty(), "frame {} should not classify", frame);
        }
        let out = a.update(&[at(0, 0.0, 0.0)]);
        assert_eq!(out.get(&0), Some(&Behavior::Stationary));
    }

    #[test]
    fn test_identical_boxes_stationary() {
        let mut a = analyzer();
        let mut last = HashMap::new();
        for _ in 0..15 {
            last = a.update(&[at(4, 100.0, 100.0)]);
        }
        assert_eq!(last.get(&4), Some(&Behavior::Stationary));
        // 退化位移不产生 NaN
        assert_eq!(a.history(4).unwrap().mean_direction_change(), 0.0);
    }

    #[test]
    fn test_slow_drift_stationary() {
        let mut a = analyzer();
        let mut last = HashMap::new();
        for i in 0..12 {
            last = a.update(&[at(0, 10.0 + i as f32, 10.0)]);
        }
        assert_eq!(last.get(&0), Some(&Behavior::Stationary));
        assert!((a.history(0).unwrap().mean_velocity().unwrap() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_straight_fast_motion_moving() {
        let mut a = analyzer();
        let mut last = HashMap::new();
        for i in 0..12 {
            last = a.update(&[at(0, i as f32 * 10.0, 0.0)]);
        }
        assert_eq!(last.get(&0), Some(&Behavior::Moving));
    }

    #[test]
    fn test_zigzag_erratic() {
        let mut a = analyzer();
        let mut last = HashMap::new();
        for i in 0..12 {
            // 来回折返: 每一步方向反转 (夹角 π)
            let x = if i % 2 == 0 { 0.0 } else { 20.0 };
            last = a.update(&[at(0, x, 0.0)]);
        }
        assert_eq!(last.get(&0), Some(&Behavior::Erratic));
        let change = a.history(0).unwrap().mean_direction_change();
        assert!((change - std::f32::consts::PI).abs() < 1e-3);
    }

    #[test]
    fn test_interactions_recorded_both_ways() {
        let mut a = analyzer();
        for i in 0..3 {
            let x = i as f32 * 10.0;
            a.update(&[at(1, x, 0.0), at(2, x + 50.0, 0.0)]);
        }
        let h1 = a.history(1).unwrap();
        let h2 = a.history(2).unwrap();
        assert_eq!(h1.interactions.iter().copied().collect::<Vec<_>>(), vec![2, 2, 2]);
        assert_eq!(h2.interactions.iter().copied().collect::<Vec<_>>(), vec![1, 1, 1]);
    }

    #[test]
    fn test_moving_pair_interacting() {
        let mut a = analyzer();
        let mut last = HashMap::new();
        for i in 0..12 {
            let x = i as f32 * 10.0;
            last = a.update(&[at(1, x, 0.0), at(2, x, 50.0)]);
        }
        assert_eq!(last.get(&1), Some(&Behavior::Interacting));
        assert_eq!(last.get(&2), Some(&Behavior::Interacting));
    }

    #[test]
    fn test_erratic_precedes_interacting() {
        let mut a = analyzer();
        let mut last = HashMap::new();
        for i in 0..12 {
            let x = if i % 2 == 0 { 0.0 } else { 20.0 };
            // 轨迹1来回折返, 轨迹2平稳前进, 二者始终在50像素内
            last = a.update(&[at(1, x, 0.0), at(2, i as f32 * 6.0, 40.0)]);
        }
        assert!(!a.history(1).unwrap().interactions.is_empty());
        assert_eq!(last.get(&1), Some(&Behavior::Erratic));
    }

    #[test]
    fn test_far_tracks_no_interaction() {
        let mut a = analyzer();
        a.update(&[at(1, 0.0, 0.0), at(2, 300.0, 0.0)]);
        assert!(a.history(1).unwrap().interactions.is_empty());
    }

    #[test]
    fn test_history_bounded_by_window() {
        let mut a = BehaviorAnalyzer::new(3, 5.0, 100.0, 5);
        for i in 0..20 {
            a.update(&[at(1, i as f32, 0.0), at(2, i as f32, 10.0)]);
        }
        let h = a.history(1).unwrap();
        assert_eq!(h.positions.len(), 5);
        assert_eq!(h.velocities.len(), 5);
        assert_eq!(h.interactions.len(), 5);
        assert_eq!(h.positions.back().unwrap().0, 19.0 + 20.0);
    }

    #[test]
    fn test_retain_drops_histories() {
        let mut a = analyzer();
        a.update(&[at(1, 0.0, 0.0), at(2, 300.0, 0.0)]);
        a.retain(|id| id == 2);
        assert!(a.history(1).is_none());
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_population_std() {
        let v = [2.0f32, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std(v.iter().copied()) - 2.0).abs() < 1e-6);
        assert_eq!(population_std(std::iter::empty()), 0.0);
    }
}
