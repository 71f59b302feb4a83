/// 逐帧处理流水线 (Per-frame Pipeline)
///
/// 一个会话独占一个 `Pipeline`, 严格按到达顺序处理帧:
/// 原始检测 → 时序一致性过滤 → 目标追踪 → 行为分析 → 异常评分
pub mod detector;

pub use detector::{non_max_suppression, Detector, ReplayDetector};

use std::collections::HashMap;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::analysis::{AnomalyScorer, BehaviorAnalyzer};
use crate::config::PipelineConfig;
use crate::detection::types::{AnnotatedDetection, Detection, TrackId};
use crate::detection::{ObjectTracker, TemporalConsistencyFilter};
use crate::error::Result;
use crate::input::{decode_frame, preprocess, validate_frame};

/// 单帧处理结果 (流水线 → 调用方)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp: String,
    pub detections: Vec<AnnotatedDetection>,
    /// 异常分超过 anomaly_threshold 的轨迹
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notable_anomalies: Vec<TrackId>,
}

/// 单帧失败 (显式错误载荷, 不影响后续帧)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameFailure {
    pub frame_index: u64,
    pub error: String,
}

/// 每帧要么是完整结果, 要么是显式错误
pub type FrameOutcome = std::result::Result<FrameReport, FrameFailure>;

pub struct Pipeline {
    config: PipelineConfig,
    filter: TemporalConsistencyFilter,
    tracker: ObjectTracker,
    behavior: BehaviorAnalyzer,
    anomaly: AnomalyScorer,

    // 统计
    frames_processed: u64,
}

impl Pipeline {
    /// 创建流水线 (配置不合法时返回错误)
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let filter = TemporalConsistencyFilter::new(config.conf_threshold, config.history_size);
        let tracker = ObjectTracker::new(
            config.interaction_distance,
            config.max_tracking_age,
            config.min_tracking_hits,
            config.min_tracking_confidence,
        );
        let behavior = BehaviorAnalyzer::new(
            config.min_behavior_frames,
            config.velocity_threshold,
            config.interaction_distance,
            config.anomaly_window,
        );
        let anomaly = AnomalyScorer::new(config.anomaly_window, config.velocity_zscore);

        Ok(Self {
            config,
            filter,
            tracker,
            behavior,
            anomaly,
            frames_processed: 0,
        })
    }

    /// 处理编码帧: 解码失败只返回错误, 不改动任何状态
    pub fn process_encoded(
        &mut self,
        bytes: &[u8],
        detector: &mut dyn Detector,
    ) -> Result<FrameReport> {
        let frame = decode_frame(bytes)?;
        self.process_frame(&frame, detector)
    }

    /// 处理已解码帧: 预处理 → 检测 → 核心流水线
    pub fn process_frame(
        &mut self,
        frame: &DynamicImage,
        detector: &mut dyn Detector,
    ) -> Result<FrameReport> {
        validate_frame(frame)?;

        let enhanced;
        let input = if self.config.preprocess.enabled {
            enhanced = preprocess(frame, &self.config.preprocess);
            &enhanced
        } else {
            frame
        };

        // 检测器失败按"本帧无检测"处理, 轨迹照常老化
        let raw = match detector.detect(input) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    detector = detector.name(),
                    frame = self.frames_processed,
                    error = %e,
                    "检测失败,按空帧处理"
                );
                Vec::new()
            }
        };

        Ok(self.process_detections(raw))
    }

    /// 核心流水线: 对一帧原始检测执行过滤/跟踪/行为/异常
    pub fn process_detections(&mut self, raw: Vec<Detection>) -> FrameReport {
        let raw_count = raw.len();

        // 1. 丢弃非有限值的检测
        let well_formed: Vec<Detection> = raw
            .into_iter()
            .filter(|d| {
                let ok = d.is_well_formed();
                if !ok {
                    debug!(class = %d.class_name, "丢弃非法检测");
                }
                ok
            })
            .collect();

        // 2. 时序一致性过滤
        let accepted = self.filter.filter(well_formed);

        // 3. 跟踪ID分配
        let ids: Vec<TrackId> = accepted.iter().map(|d| self.tracker.assign(d)).collect();

        // 4. 帧结束: 老化/删除轨迹, 同步清理行为历史
        let evicted = self.tracker.end_frame();
        if !evicted.is_empty() {
            let tracker = &self.tracker;
            self.behavior.retain(|id| tracker.contains(id));
        }

        let mut detections: Vec<AnnotatedDetection> = accepted
            .iter()
            .cloned()
            .zip(ids)
            .map(|(det, id)| {
                let confirmed = self.tracker.is_confirmed(id);
                AnnotatedDetection::new(det, id, confirmed)
            })
            .collect();

        // 5. 更新帧历史
        self.filter.record_frame(accepted);

        // 6. 行为分析 + 异常评分
        let behaviors = self.behavior.update(&detections);
        let scores = self.anomaly.score(&detections, &behaviors, &self.behavior);

        for det in &mut detections {
            det.behavior = behaviors.get(&det.track_id).copied();
            det.anomaly_score = scores.get(&det.track_id).copied();
        }

        let notable_anomalies = self.notable(&scores);
        for id in &notable_anomalies {
            warn!(
                track_id = id,
                score = scores[id],
                frame = self.frames_processed,
                "检测到异常行为"
            );
        }

        debug!(
            frame = self.frames_processed,
            raw = raw_count,
            accepted = detections.len(),
            tracks = self.tracker.len(),
            "帧处理完成"
        );

        let report = FrameReport {
            frame_index: self.frames_processed,
            timestamp: chrono::Utc::now().to_rfc3339(),
            detections,
            notable_anomalies,
        };
        self.frames_processed += 1;
        report
    }

    fn notable(&self, scores: &HashMap<TrackId, f32>) -> Vec<TrackId> {
        let mut ids: Vec<TrackId> = scores
            .iter()
            .filter(|(_, &s)| s > self.config.anomaly_threshold)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// 会话结束: 丢弃所有轨迹与历史
    pub fn reset(&mut self) {
        self.filter.reset();
        self.tracker.reset();
        self.behavior.reset();
        self.anomaly.reset();
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn tracker(&self) -> &ObjectTracker {
        &self.tracker
    }

    pub fn behavior(&self) -> &BehaviorAnalyzer {
        &self.behavior
    }

    pub fn anomaly(&self) -> &AnomalyScorer {
        &self.anomaly
    }

    pub fn frame_history_len(&self) -> usize {
        self.filter.history().len()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }
}
