//! 会话注册表 (Session Registry)
//!
//! 每个会话 (一路视频连接) 独占一个 `Pipeline` 和一个工作线程:
//! 调用方 → 有界队列 → 工作线程 (按到达顺序处理) → 回复通道 + ResultStore
//!
//! 流水线本身不知道会话ID, 会话ID只存在于这一层。

use std::collections::HashMap;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::detection::types::Detection;
use crate::error::{PipelineError, Result};
use crate::input::decode_frame;
use crate::pipeline::{Detector, FrameFailure, FrameOutcome, FrameReport, Pipeline};
use crate::store::ResultStore;

/// 默认每个会话的排队帧数
pub const DEFAULT_QUEUE_CAPACITY: usize = 120;

/// 一帧输入
#[derive(Clone, Debug)]
pub enum FrameInput {
    /// 编码图像 (JPEG/PNG/...)
    Encoded(Vec<u8>),
    /// 已解码图像
    Image(DynamicImage),
    /// 外部检测器已产出的原始检测 (跳过本会话的检测器)
    Detections(Vec<Detection>),
    /// 一行JSON格式的原始检测数组 (原始字节, 非UTF-8同样按解析失败处理)
    Json(Vec<u8>),
}

/// 会话结束时的统计
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionSummary {
    pub frames: u64,
    pub failures: u64,
    pub tracks_assigned: u32,
}

struct Job {
    input: FrameInput,
    reply: Sender<FrameOutcome>,
}

struct SessionHandle {
    tx: Sender<Job>,
    worker: JoinHandle<SessionSummary>,
}

/// 活跃会话表, 由传输层持有
pub struct SessionRegistry {
    store: Arc<dyn ResultStore>,
    sessions: HashMap<String, SessionHandle>,
    queue_capacity: usize,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self::with_queue_capacity(store, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(store: Arc<dyn ResultStore>, queue_capacity: usize) -> Self {
        Self {
            store,
            sessions: HashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// 建立会话: 校验配置, 创建流水线并启动工作线程
    pub fn register(
        &mut self,
        id: impl Into<String>,
        config: PipelineConfig,
        detector: Box<dyn Detector>,
    ) -> Result<()> {
        let id = id.into();
        if self.sessions.contains_key(&id) {
            return Err(PipelineError::DuplicateSession(id));
        }

        let pipeline = Pipeline::new(config)?;
        let (tx, rx) = crossbeam_channel::bounded(self.queue_capacity);
        let store = Arc::clone(&self.store);

        let worker = thread::Builder::new()
            .name(format!("session-{}", id))
            .spawn({
                let id = id.clone();
                move || run_session(id, pipeline, detector, store, rx)
            })?;

        info!(session = %id, detector_queue = self.queue_capacity, "会话已注册");
        self.sessions.insert(id, SessionHandle { tx, worker });
        Ok(())
    }

    /// 提交一帧并等待结果 (同一会话的帧按提交顺序处理)
    pub fn submit(&self, id: &str, input: FrameInput) -> Result<FrameOutcome> {
        let handle = self
            .sessions
            .get(id)
            .ok_or_else(|| PipelineError::SessionNotFound(id.to_string()))?;

        let (reply, outcome) = crossbeam_channel::bounded(1);
        handle
            .tx
            .send(Job { input, reply })
            .map_err(|_| PipelineError::SessionClosed(id.to_string()))?;
        outcome
            .recv()
            .map_err(|_| PipelineError::SessionClosed(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// 已注册的会话ID (排序后)
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// 结束会话: 关闭队列, 等待工作线程处理完已排队的帧
    pub fn remove(&mut self, id: &str) -> Result<SessionSummary> {
        let handle = self
            .sessions
            .remove(id)
            .ok_or_else(|| PipelineError::SessionNotFound(id.to_string()))?;
        join_session(id, handle)
    }

    /// 结束所有会话
    pub fn shutdown(&mut self) -> Vec<(String, Result<SessionSummary>)> {
        self.ids()
            .into_iter()
            .filter_map(|id| {
                let handle = self.sessions.remove(&id)?;
                let summary = join_session(&id, handle);
                Some((id, summary))
            })
            .collect()
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        if !self.sessions.is_empty() {
            self.shutdown();
        }
    }
}

fn join_session(id: &str, handle: SessionHandle) -> Result<SessionSummary> {
    let SessionHandle { tx, worker } = handle;
    drop(tx);
    worker
        .join()
        .map_err(|_| PipelineError::SessionClosed(id.to_string()))
}

// ========== 工作线程 ==========

fn run_session(
    id: String,
    mut pipeline: Pipeline,
    mut detector: Box<dyn Detector>,
    store: Arc<dyn ResultStore>,
    rx: Receiver<Job>,
) -> SessionSummary {
    info!(session = %id, detector = detector.name(), "会话开始");
    let mut summary = SessionSummary::default();

    for job in rx.iter() {
        let frame_index = summary.frames;
        summary.frames += 1;

        let outcome = match process_input(&mut pipeline, &mut *detector, job.input) {
            Ok(mut report) => {
                report.frame_index = frame_index;
                Ok(report)
            }
            Err(e) => {
                warn!(session = %id, frame = frame_index, error = %e, "帧处理失败");
                summary.failures += 1;
                Err(FrameFailure {
                    frame_index,
                    error: e.to_string(),
                })
            }
        };

        if let Err(e) = store.save(&id, &outcome) {
            warn!(session = %id, frame = frame_index, error = %e, "结果保存失败");
        }
        if job.reply.send(outcome).is_err() {
            debug!(session = %id, frame = frame_index, "调用方已放弃等待结果");
        }
    }

    if let Err(e) = store.flush() {
        warn!(session = %id, error = %e, "结果刷新失败");
    }

    summary.tracks_assigned = pipeline.tracker().total_assigned();
    pipeline.reset();
    info!(
        session = %id,
        frames = summary.frames,
        failures = summary.failures,
        tracks = summary.tracks_assigned,
        "会话结束"
    );
    summary
}

fn process_input(
    pipeline: &mut Pipeline,
    detector: &mut dyn Detector,
    input: FrameInput,
) -> Result<FrameReport> {
    match input {
        FrameInput::Encoded(bytes) => {
            let frame = decode_frame(&bytes)?;
            pipeline.process_frame(&frame, detector)
        }
        FrameInput::Image(frame) => pipeline.process_frame(&frame, detector),
        FrameInput::Detections(raw) => Ok(pipeline.process_detections(raw)),
        FrameInput::Json(line) => {
            let raw: Vec<Detection> = serde_json::from_slice(&line)?;
            Ok(pipeline.process_detections(raw))
        }
    }
}

/// 按行切分 JSON Lines 检测流
///
/// 只有读取本身的IO错误会返回 `Err`; 行内容 (包括非UTF-8字节) 原样交给会话,
/// 解析失败记为该帧失败。空白行和行尾 `\r` 被忽略。
pub fn json_lines<R: BufRead>(reader: R) -> impl Iterator<Item = io::Result<FrameInput>> {
    reader.split(b'\n').filter_map(|line| match line {
        Ok(mut bytes) => {
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            if bytes.iter().all(u8::is_ascii_whitespace) {
                None
            } else {
                Some(Ok(FrameInput::Json(bytes)))
            }
        }
        Err(e) => Some(Err(e)),
    })
}
