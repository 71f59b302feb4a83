//! 结果存储 (Result Store)
//!
//! 会话注册表持有一个共享的 `Arc<dyn ResultStore>`, 每帧结果 (成功或失败) 都写入其中。
//! - MemoryStore:     进程内保存, 按会话查询 (测试/嵌入式使用)
//! - JsonLinesStore:  每帧一行JSON写入任意 `Write` (文件/stdout)

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::pipeline::{FrameFailure, FrameOutcome, FrameReport};

/// 一条存储记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StoredFrame {
    Ok {
        session: String,
        #[serde(flatten)]
        report: FrameReport,
    },
    Failed {
        session: String,
        #[serde(flatten)]
        failure: FrameFailure,
    },
}

impl StoredFrame {
    pub fn new(session: &str, outcome: &FrameOutcome) -> Self {
        match outcome {
            Ok(report) => StoredFrame::Ok {
                session: session.to_string(),
                report: report.clone(),
            },
            Err(failure) => StoredFrame::Failed {
                session: session.to_string(),
                failure: failure.clone(),
            },
        }
    }

    pub fn session(&self) -> &str {
        match self {
            StoredFrame::Ok { session, .. } | StoredFrame::Failed { session, .. } => session,
        }
    }

    pub fn frame_index(&self) -> u64 {
        match self {
            StoredFrame::Ok { report, .. } => report.frame_index,
            StoredFrame::Failed { failure, .. } => failure.frame_index,
        }
    }
}

/// 结果存储接口 (多个会话线程并发调用)
pub trait ResultStore: Send + Sync {
    fn save(&self, session: &str, outcome: &FrameOutcome) -> Result<()>;

    /// 刷新缓冲 (默认无操作)
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

fn poisoned() -> PipelineError {
    PipelineError::Io(std::io::Error::other("结果存储锁已中毒"))
}

// ========== 内存存储 ==========

#[derive(Debug, Default)]
pub struct MemoryStore {
    frames: Mutex<HashMap<String, Vec<StoredFrame>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某会话的全部记录 (按写入顺序)
    pub fn frames(&self, session: &str) -> Vec<StoredFrame> {
        self.frames
            .lock()
            .map(|m| m.get(session).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// 某会话的成功结果
    pub fn reports(&self, session: &str) -> Vec<FrameReport> {
        self.frames(session)
            .into_iter()
            .filter_map(|f| match f {
                StoredFrame::Ok { report, .. } => Some(report),
                StoredFrame::Failed { .. } => None,
            })
            .collect()
    }

    pub fn sessions(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .frames
            .lock()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn total(&self) -> usize {
        self.frames
            .lock()
            .map(|m| m.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

impl ResultStore for MemoryStore {
    fn save(&self, session: &str, outcome: &FrameOutcome) -> Result<()> {
        let mut frames = self.frames.lock().map_err(|_| poisoned())?;
        frames
            .entry(session.to_string())
            .or_default()
            .push(StoredFrame::new(session, outcome));
        Ok(())
    }
}

// ========== JSON Lines 存储 ==========

pub struct JsonLinesStore<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesStore<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// 取回底层 writer
    pub fn into_inner(self) -> Result<W> {
        self.writer.into_inner().map_err(|_| poisoned())
    }
}

impl<W: Write + Send> ResultStore for JsonLinesStore<W> {
    fn save(&self, session: &str, outcome: &FrameOutcome) -> Result<()> {
        let line = serde_json::to_string(&StoredFrame::new(session, outcome))?;
        let mut writer = self.writer.lock().map_err(|_| poisoned())?;
        writeln!(writer, "{}", line)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.writer.lock().map_err(|_| poisoned())?.flush()?;
        Ok(())
    }
}
