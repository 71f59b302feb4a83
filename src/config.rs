//! 流水线配置 - 通过JSON文件调整参数

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

/// 速度异常的z-score计算方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VelocityZScore {
    /// 最新速度相对窗口内历史速度 (均值/标准差)
    #[default]
    Baseline,
    /// 兼容旧输出: 窗口均值与自身比较, 恒为0
    Legacy,
}

/// 帧预处理参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub enabled: bool,
    pub equalize: bool,      // 亮度直方图均衡
    pub denoise_radius: u32, // 中值滤波半径 (0=关闭)
    pub sharpen: bool,       // 3x3 锐化
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            equalize: true,
            denoise_radius: 1,
            sharpen: true,
        }
    }
}

/// 流水线参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === 检测参数 ===
    pub conf_threshold: f32, // 检测置信度基线
    pub iou_threshold: f32,  // 交给检测器做NMS,流水线内部不用

    // === 跟踪参数 ===
    pub interaction_distance: f32,    // 匹配半径 & 交互半径 (像素)
    pub max_tracking_age: u32,        // 连续未匹配帧数上限
    pub min_tracking_hits: u32,       // 轨迹确认所需命中次数
    pub min_tracking_confidence: f32, // 计入命中的最低置信度

    // === 时序一致性 ===
    pub history_size: usize, // 帧历史长度

    // === 行为分析 ===
    pub min_behavior_frames: usize, // 开始分类所需最少位置数
    pub velocity_threshold: f32,    // 静止判定阈值(像素/帧)

    // === 异常评分 ===
    pub anomaly_window: usize,    // 滚动窗口长度
    pub anomaly_threshold: f32,   // 值得告警的异常分
    pub velocity_zscore: VelocityZScore,

    pub preprocess: PreprocessConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.45,
            iou_threshold: 0.5,

            interaction_distance: 100.0,
            max_tracking_age: 30,
            min_tracking_hits: 3,
            min_tracking_confidence: 0.3,

            history_size: 10,

            min_behavior_frames: 10,
            velocity_threshold: 5.0,

            anomaly_window: 30,
            anomaly_threshold: 0.8,
            velocity_zscore: VelocityZScore::Baseline,

            preprocess: PreprocessConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载配置 (并校验)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        info!(path = %path.as_ref().display(), "配置已加载");
        Ok(config)
    }

    /// 加载配置, 文件不存在时创建默认配置
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        warn!(path = %path.display(), "配置文件不存在,创建默认配置");
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!(path = %path.as_ref().display(), "配置已保存");
        Ok(())
    }

    /// 参数合法性检查 (会话建立前调用)
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, v: f32| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(PipelineError::Config(format!("{} 必须在 [0,1] 内, 当前 {}", name, v)))
            }
        };
        unit("conf_threshold", self.conf_threshold)?;
        unit("iou_threshold", self.iou_threshold)?;
        unit("min_tracking_confidence", self.min_tracking_confidence)?;
        unit("anomaly_threshold", self.anomaly_threshold)?;

        if !(self.interaction_distance.is_finite() && self.interaction_distance > 0.0) {
            return Err(PipelineError::Config(format!(
                "interaction_distance 必须为正数, 当前 {}",
                self.interaction_distance
            )));
        }
        if !(self.velocity_threshold.is_finite() && self.velocity_threshold >= 0.0) {
            return Err(PipelineError::Config(format!(
                "velocity_threshold 不能为负, 当前 {}",
                self.velocity_threshold
            )));
        }
        if self.max_tracking_age == 0 {
            return Err(PipelineError::Config("max_tracking_age 至少为 1".into()));
        }
        if self.history_size == 0 {
            return Err(PipelineError::Config("history_size 至少为 1".into()));
        }
        if self.min_behavior_frames == 0 {
            return Err(PipelineError::Config("min_behavior_frames 至少为 1".into()));
        }
        if self.anomaly_window < 2 {
            return Err(PipelineError::Config("anomaly_window 至少为 2".into()));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!(
            conf = self.conf_threshold,
            distance = self.interaction_distance,
            max_age = self.max_tracking_age,
            history = self.history_size,
            min_frames = self.min_behavior_frames,
            window = self.anomaly_window,
            zscore = ?self.velocity_zscore,
            "当前流水线配置"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.conf_threshold, 0.45);
        assert_eq!(config.interaction_distance, 100.0);
        assert_eq!(config.max_tracking_age, 30);
        assert_eq!(config.history_size, 10);
        assert_eq!(config.min_behavior_frames, 10);
        assert_eq!(config.anomaly_window, 30);
        assert_eq!(config.velocity_zscore, VelocityZScore::Baseline);
        assert!(!config.preprocess.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"conf_threshold":0.6,"velocity_zscore":"legacy"}"#).unwrap();
        assert_eq!(config.conf_threshold, 0.6);
        assert_eq!(config.velocity_zscore, VelocityZScore::Legacy);
        assert_eq!(config.max_tracking_age, 30);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.conf_threshold = 1.5;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut config = PipelineConfig::default();
        config.anomaly_window = 1;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.interaction_distance = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_create_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sentinel.json");

        let created = PipelineConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, PipelineConfig::default());

        let mut changed = created.clone();
        changed.max_tracking_age = 12;
        changed.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap().max_tracking_age, 12);
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, r#"{"history_size":0}"#).unwrap();
        assert!(matches!(
            PipelineConfig::load(&path),
            Err(PipelineError::Config(_))
        ));
    }
}
