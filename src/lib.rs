// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod analysis; // 行为分析 & 异常评分
pub mod config; // 流水线配置参数
pub mod demo; // 合成演示场景
pub mod detection; // 检测过滤 & 目标追踪
pub mod error; // 统一错误类型
pub mod input; // 帧输入 & 预处理
pub mod pipeline; // 逐帧处理流水线
pub mod renderer; // 结果绘制
pub mod session; // 会话注册表
pub mod store; // 结果存储

pub use crate::analysis::{AnomalyScorer, BehaviorAnalyzer, BehaviorHistory};
pub use crate::config::{PipelineConfig, PreprocessConfig, VelocityZScore};
pub use crate::demo::DemoScene;
pub use crate::detection::{
    track_color, AnnotatedDetection, BBox, Behavior, Detection, ObjectTracker,
    TemporalConsistencyFilter, TrackId,
};
pub use crate::error::{PipelineError, Result};
pub use crate::pipeline::{
    non_max_suppression, Detector, FrameFailure, FrameOutcome, FrameReport, Pipeline,
    ReplayDetector,
};
pub use crate::session::{json_lines, FrameInput, SessionRegistry, SessionSummary};
pub use crate::store::{JsonLinesStore, MemoryStore, ResultStore, StoredFrame};

/// 时间字符串 (用于输出文件名), 各字段以 `delimiter` 分隔
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
