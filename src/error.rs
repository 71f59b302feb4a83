//! 统一错误类型
//! Error type shared by the pipeline, sessions and stores

use thiserror::Error;

/// 流水线错误
///
/// 单帧错误 (Decode / InvalidFrame / Detector) 只影响当前帧,
/// 会话级错误 (Config / DuplicateSession) 在建立会话时返回。
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("图像解码失败: {0}")]
    Decode(#[from] image::ImageError),

    #[error("无效帧尺寸: {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    #[error("检测器错误: {0}")]
    Detector(String),

    #[error("配置无效: {0}")]
    Config(String),

    #[error("会话不存在: {0}")]
    SessionNotFound(String),

    #[error("会话已存在: {0}")]
    DuplicateSession(String),

    #[error("会话已关闭: {0}")]
    SessionClosed(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
