/// 检测系统 (Detection System)
///
/// 原始检测 → 时序一致性过滤 → 目标追踪
/// - TemporalConsistencyFilter: 低置信度检测需要历史佐证
/// - ObjectTracker:             就近匹配分配跟踪ID
pub mod temporal;
pub mod tracker;
pub mod types;

pub use temporal::{FrameHistory, TemporalConsistencyFilter};
pub use tracker::{track_color, ObjectTracker, Track, TrackState};
pub use types::{AnnotatedDetection, BBox, Behavior, Detection, TrackId};
