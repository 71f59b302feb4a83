/// 检测系统数据结构定义
/// Data structures for the detection pipeline
use serde::{Deserialize, Serialize};
use std::fmt;

/// 跟踪ID (会话内单调递增,永不复用)
pub type TrackId = u32;

// ========== 数据结构 ==========

/// 检测框 (x1, y1, x2, y2), JSON中表示为 `[x1, y1, x2, y2]`
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// 面积 (退化框为0)
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// 中心点
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// 中心点欧氏距离
    pub fn center_distance(&self, other: &BBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// 平移 (生成合成场景/测试用)
    pub fn shifted(&self, dx: f32, dy: f32) -> Self {
        Self::new(self.x1 + dx, self.y1 + dy, self.x2 + dx, self.y2 + dy)
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// 计算两个边界框的IOU (Intersection over Union)
    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union <= 0.0 {
            return 0.0;
        }

        intersection / union
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// 原始检测 (检测器 → 流水线), 创建后不可变
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub class_name: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BBox, class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_name: class_name.into(),
            confidence,
        }
    }

    /// 坐标与置信度均为有限值
    pub fn is_well_formed(&self) -> bool {
        self.bbox.is_finite() && self.confidence.is_finite()
    }
}

/// 行为标签
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    Stationary,
    Moving,
    Erratic,
    Interacting,
}

impl Behavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Behavior::Stationary => "stationary",
            Behavior::Moving => "moving",
            Behavior::Erratic => "erratic",
            Behavior::Interacting => "interacting",
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 标注后的检测 (流水线 → 调用方)
///
/// `behavior` / `anomaly_score` 只在轨迹历史足够长之后出现
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedDetection {
    pub bbox: BBox,
    pub class_name: String,
    pub confidence: f32,
    pub track_id: TrackId,
    /// 轨迹已确认 (命中次数 ≥ min_tracking_hits)
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<Behavior>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_score: Option<f32>,
}

impl AnnotatedDetection {
    pub fn new(detection: Detection, track_id: TrackId, confirmed: bool) -> Self {
        Self {
            bbox: detection.bbox,
            class_name: detection.class_name,
            confidence: detection.confidence,
            track_id,
            confirmed,
            behavior: None,
            anomaly_score: None,
        }
    }
}
