//! 多目标跟踪: 按中心点距离就近匹配
//! Proximity-based multi-object tracker
//!
//! 每个检测依次找同类、本帧尚未匹配、中心距离最近的轨迹, 距离小于
//! `interaction_distance` 即复用其ID, 否则新建轨迹。贪心匹配而非最优二分匹配,
//! 两个目标交叉时ID可能互换。

use tracing::debug;

use super::types::{BBox, Detection, TrackId};

/// 轨迹生命周期
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    /// 刚创建 (age=0, 只出现过一帧)
    New,
    /// 本帧匹配成功
    Active,
    /// 连续未匹配, age 递增中
    Stale,
}

/// 跟踪对象
#[derive(Clone, Debug)]
pub struct Track {
    /// 唯一跟踪ID
    pub track_id: TrackId,

    /// 最近一次匹配的边界框
    pub bbox: BBox,

    pub class_name: String,

    /// 连续未匹配帧数
    pub age: u32,

    /// 置信度达标的匹配次数 (含创建)
    pub hits: u32,

    /// 总共被匹配的帧数
    pub total_frames: u32,

    matched: bool,
}

impl Track {
    fn new(track_id: TrackId, detection: &Detection, min_confidence: f32) -> Self {
        Self {
            track_id,
            bbox: detection.bbox,
            class_name: detection.class_name.clone(),
            age: 0,
            hits: u32::from(detection.confidence >= min_confidence),
            total_frames: 1,
            matched: true,
        }
    }

    fn update(&mut self, detection: &Detection, min_confidence: f32) {
        self.bbox = detection.bbox;
        self.age = 0;
        self.total_frames += 1;
        if detection.confidence >= min_confidence {
            self.hits += 1;
        }
        self.matched = true;
    }

    /// 获取中心点
    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }

    pub fn state(&self) -> TrackState {
        if self.age > 0 {
            TrackState::Stale
        } else if self.total_frames == 1 {
            TrackState::New
        } else {
            TrackState::Active
        }
    }
}

/// 就近匹配跟踪器 (一个会话独占一个实例)
#[derive(Clone, Debug)]
pub struct ObjectTracker {
    /// 当前活跃轨迹 (按创建顺序)
    tracks: Vec<Track>,

    /// 下一个分配的ID
    next_id: TrackId,

    /// 匹配半径 (像素)
    match_distance: f32,

    /// 最大允许丢失帧数
    max_age: u32,

    /// 确认所需命中次数
    min_hits: u32,

    /// 计入命中的最低置信度
    min_confidence: f32,
}

impl ObjectTracker {
    pub fn new(match_distance: f32, max_age: u32, min_hits: u32, min_confidence: f32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 0,
            match_distance,
            max_age,
            min_hits,
            min_confidence,
        }
    }

    /// 为一个已接受的检测分配跟踪ID (复用或新建)
    pub fn assign(&mut self, detection: &Detection) -> TrackId {
        let nearest = self
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.matched && t.class_name == detection.class_name)
            .map(|(idx, t)| (idx, t.bbox.center_distance(&detection.bbox)))
            .filter(|(_, d)| d.is_finite())
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((idx, distance)) = nearest {
            if distance < self.match_distance {
                let track = &mut self.tracks[idx];
                track.update(detection, self.min_confidence);
                return track.track_id;
            }
        }

        let track_id = self.next_id;
        self.next_id += 1;
        self.tracks
            .push(Track::new(track_id, detection, self.min_confidence));
        debug!(track_id, class = %detection.class_name, "新建轨迹");
        track_id
    }

    /// 帧结束: 未匹配轨迹 age+1, 删除 age ≥ max_age 的轨迹, 返回被删除的ID
    pub fn end_frame(&mut self) -> Vec<TrackId> {
        for track in &mut self.tracks {
            if track.matched {
                track.matched = false;
            } else {
                track.age += 1;
            }
        }

        let max_age = self.max_age;
        let mut evicted = Vec::new();
        self.tracks.retain(|t| {
            if t.age >= max_age {
                evicted.push(t.track_id);
                false
            } else {
                true
            }
        });

        if !evicted.is_empty() {
            debug!(?evicted, "删除丢失太久的轨迹");
        }
        evicted
    }

    /// 轨迹是否已确认
    pub fn is_confirmed(&self, track_id: TrackId) -> bool {
        self.get(track_id)
            .map(|t| t.hits >= self.min_hits)
            .unwrap_or(false)
    }

    pub fn get(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    pub fn active_tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn contains(&self, track_id: TrackId) -> bool {
        self.get(track_id).is_some()
    }

    /// 获取当前跟踪数量
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// 已分配过的ID总数
    pub fn total_assigned(&self) -> u32 {
        self.next_id
    }

    /// 重置跟踪器 (清除所有跟踪, ID 计数不回退)
    pub fn reset(&mut self) {
        self.tracks.clear();
    }
}

// ========== 工具函数 ==========

/// 根据ID生成不同颜色 (纯函数, 同一ID颜色恒定)
pub fn track_color(id: TrackId) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

/// HSV转RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(x: f32, y: f32) -> Detection {
        Detection::new(BBox::new(x, y, x + 40.0, y + 40.0), "person", 0.9)
    }

    fn tracker() -> ObjectTracker {
        ObjectTracker::new(100.0, 30, 3, 0.3)
    }

    #[test]
    fn test_ids_monotonic_from_zero() {
        let mut t = tracker();
        let a = t.assign(&person(0.0, 0.0));
        let b = t.assign(&person(500.0, 0.0));
        let c = t.assign(&Detection::new(BBox::new(0.0, 0.0, 40.0, 40.0), "car", 0.9));
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(t.total_assigned(), 3);
    }

    #[test]
    fn test_approaching_track_keeps_id() {
        let mut t = tracker();
        let mut ids = Vec::new();
        // 距离逐帧缩小, 始终小于匹配半径
        for step in 0..8 {
            let x = 90.0 - (step * step) as f32;
            ids.push(t.assign(&person(x.max(0.0), 0.0)));
            t.end_frame();
        }
        assert!(ids.iter().all(|&id| id == ids[0]));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_far_detection_creates_new_track() {
        let mut t = tracker();
        let a = t.assign(&person(0.0, 0.0));
        t.end_frame();
        let b = t.assign(&person(150.0, 0.0));
        assert_ne!(a, b);
    }

    #[test]
    fn test_age_and_eviction() {
        let mut t = ObjectTracker::new(100.0, 5, 3, 0.3);
        let id = t.assign(&person(0.0, 0.0));
        assert!(t.end_frame().is_empty());
        assert_eq!(t.get(id).unwrap().age, 0);

        for frame in 1..5 {
            assert!(t.end_frame().is_empty());
            assert_eq!(t.get(id).unwrap().age, frame);
            assert_eq!(t.get(id).unwrap().state(), TrackState::Stale);
        }
        // 第5个未匹配帧: age=5 ≥ max_age → 删除
        assert_eq!(t.end_frame(), vec![id]);
        assert!(!t.contains(id));
    }

    #[test]
    fn test_match_resets_age() {
        let mut t = tracker();
        let id = t.assign(&person(0.0, 0.0));
        t.end_frame();
        t.end_frame();
        t.end_frame();
        assert_eq!(t.get(id).unwrap().age, 2);
        assert_eq!(t.assign(&person(5.0, 0.0)), id);
        assert_eq!(t.get(id).unwrap().age, 0);
        assert_eq!(t.get(id).unwrap().state(), TrackState::Active);
    }

    #[test]
    fn test_evicted_id_never_reused() {
        let mut t = ObjectTracker::new(100.0, 1, 3, 0.3);
        let a = t.assign(&person(0.0, 0.0));
        t.end_frame();
        assert_eq!(t.end_frame(), vec![a]);
        let b = t.assign(&person(0.0, 0.0));
        assert!(b > a);
    }

    #[test]
    fn test_class_must_match() {
        let mut t = tracker();
        let a = t.assign(&person(0.0, 0.0));
        t.end_frame();
        let b = t.assign(&Detection::new(BBox::new(0.0, 0.0, 40.0, 40.0), "dog", 0.9));
        assert_ne!(a, b);
    }

    #[test]
    fn test_nearest_track_wins() {
        let mut t = tracker();
        let a = t.assign(&person(0.0, 0.0));
        let b = t.assign(&person(120.0, 0.0));
        t.end_frame();
        // 距 b 更近 (20 vs 100)
        assert_eq!(t.assign(&person(100.0, 0.0)), b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_one_track_per_detection_per_frame() {
        let mut t = tracker();
        let a = t.assign(&person(0.0, 0.0));
        t.end_frame();
        // 两个检测都靠近 a, 第二个只能新建
        let first = t.assign(&person(5.0, 0.0));
        let second = t.assign(&person(10.0, 0.0));
        assert_eq!(first, a);
        assert_ne!(second, a);
    }

    #[test]
    fn test_greedy_crossing_swaps_ids() {
        // 两人相向而行: A 在 x=0 向右, B 在 x=110 向左
        let mut t = tracker();
        let a = t.assign(&person(0.0, 0.0));
        let b = t.assign(&person(110.0, 0.0));
        t.end_frame();

        // 交叉后 A 的检测 (x=70) 先处理, 贪心选最近的轨迹 b (距离40 < 70)
        let det_a = t.assign(&person(70.0, 0.0));
        let det_b = t.assign(&person(40.0, 0.0));
        assert_eq!(det_a, b);
        assert_eq!(det_b, a);
    }

    #[test]
    fn test_confirmation_needs_confident_hits() {
        let mut t = ObjectTracker::new(100.0, 30, 3, 0.5);
        let weak = |x: f32| Detection::new(BBox::new(x, 0.0, x + 40.0, 40.0), "person", 0.4);
        let id = t.assign(&person(0.0, 0.0));
        t.end_frame();
        assert!(!t.is_confirmed(id));
        t.assign(&weak(2.0));
        t.end_frame();
        assert_eq!(t.get(id).unwrap().hits, 1);
        t.assign(&person(4.0, 0.0));
        t.end_frame();
        assert!(!t.is_confirmed(id));
        t.assign(&person(6.0, 0.0));
        t.end_frame();
        assert!(t.is_confirmed(id));
        assert!(!t.is_confirmed(999));
    }

    #[test]
    fn test_track_color_deterministic() {
        assert_eq!(track_color(7), track_color(7));
        assert_ne!(track_color(1), track_color(2));
    }

    #[test]
    fn test_reset_keeps_id_counter() {
        let mut t = tracker();
        t.assign(&person(0.0, 0.0));
        t.reset();
        assert_eq!(t.len(), 0);
        assert_eq!(t.assign(&person(0.0, 0.0)), 1);
    }
}
