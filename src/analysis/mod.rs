/// 行为分析系统 (Analysis System)
///
/// - BehaviorAnalyzer: 轨迹历史 → 行为标签
/// - AnomalyScorer:    轨迹历史 + 行为 → 异常分
pub mod anomaly;
pub mod behavior;

pub use anomaly::AnomalyScorer;
pub use behavior::{BehaviorAnalyzer, BehaviorHistory};
