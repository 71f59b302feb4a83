//! 异常评分 (Anomaly Scoring)
//!
//! 分数由四部分叠加, 最终截断到 [0, 1]:
//! 1. 速度偏离: min(|z| / 3, 1)
//! 2. 行为: erratic +0.3, interacting +0.2
//! 3. 交互次数 > 2: +0.2
//! 4. 位置离散度 (两轴标准差均值) > 100px: +0.3

use std::collections::{HashMap, VecDeque};

use super::behavior::{mean, population_std, push_bounded, BehaviorAnalyzer, BehaviorHistory};
use crate::config::VelocityZScore;
use crate::detection::types::{AnnotatedDetection, Behavior, TrackId};

const ERRATIC_WEIGHT: f32 = 0.3;
const INTERACTING_WEIGHT: f32 = 0.2;
const INTERACTION_WEIGHT: f32 = 0.2;
const INTERACTION_COUNT: usize = 2;
const SPREAD_WEIGHT: f32 = 0.3;
const SPREAD_PIXELS: f32 = 100.0;

/// 异常评分器, 附带会话级滚动分数窗口 (仅用于诊断)
#[derive(Clone, Debug)]
pub struct AnomalyScorer {
    recent: VecDeque<f32>,
    window: usize,
    zscore: VelocityZScore,
}

impl AnomalyScorer {
    pub fn new(window: usize, zscore: VelocityZScore) -> Self {
        Self {
            recent: VecDeque::with_capacity(window + 1),
            window: window.max(1),
            zscore,
        }
    }

    /// 为历史足够长的轨迹打分
    pub fn score(
        &mut self,
        detections: &[AnnotatedDetection],
        behaviors: &HashMap<TrackId, Behavior>,
        analyzer: &BehaviorAnalyzer,
    ) -> HashMap<TrackId, f32> {
        let mut scores = HashMap::new();
        for det in detections {
            if !analyzer.is_qualified(det.track_id) {
                continue;
            }
            let Some(history) = analyzer.history(det.track_id) else {
                continue;
            };
            let score = self.score_track(history, behaviors.get(&det.track_id).copied());
            push_bounded(&mut self.recent, score, self.window);
            scores.insert(det.track_id, score);
        }
        scores
    }

    /// 单条轨迹的异常分 (不修改滚动窗口)
    pub fn score_track(&self, history: &BehaviorHistory, behavior: Option<Behavior>) -> f32 {
        let mut score = 0.0;

        // 1. 速度偏离
        if let Some(z) = self.velocity_zscore(history) {
            score += (z.abs() / 3.0).min(1.0);
        }

        // 2. 行为
        match behavior {
            Some(Behavior::Erratic) => score += ERRATIC_WEIGHT,
            Some(Behavior::Interacting) => score += INTERACTING_WEIGHT,
            _ => {}
        }

        // 3. 频繁交互
        if history.interactions.len() > INTERACTION_COUNT {
            score += INTERACTION_WEIGHT;
        }

        // 4. 位置离散度
        if history.positions.len() > 2 && history.position_spread() > SPREAD_PIXELS {
            score += SPREAD_WEIGHT;
        }

        if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// 速度z-score, 标准差为0或样本不足时返回 None
    fn velocity_zscore(&self, history: &BehaviorHistory) -> Option<f32> {
        let velocities = &history.velocities;
        match self.zscore {
            VelocityZScore::Baseline => {
                let &current = velocities.back()?;
                let prior_len = velocities.len() - 1;
                if prior_len < 2 {
                    return None;
                }
                let prior = velocities.iter().take(prior_len).copied();
                let m = mean(prior.clone())?;
                let std = population_std(prior);
                (std > 0.0).then(|| (current - m) / std)
            }
            VelocityZScore::Legacy => {
                let m = mean(velocities.iter().copied())?;
                let std = population_std(velocities.iter().copied());
                (std > 0.0).then(|| (m - m) / std)
            }
        }
    }

    /// 最近的异常分 (旧 → 新)
    pub fn recent_scores(&self) -> impl Iterator<Item = f32> + '_ {
        self.recent.iter().copied()
    }

    pub fn recent_mean(&self) -> Option<f32> {
        mean(self.recent.iter().copied())
    }

    pub fn recent_max(&self) -> Option<f32> {
        self.recent.iter().copied().reduce(f32::max)
    }

    pub fn reset(&mut self) {
        self.recent.clear();
    }
}
