/// 数字卫兵 (Digital Sentinel)
///
/// 检测结果回放 / 合成场景演示
///
/// 处理流程:
/// 1. 输入: JSON Lines 检测文件 (每行一帧) 或 带种子的合成场景
/// 2. 会话线程: 时序过滤 → 目标追踪 → 行为分析 → 异常评分
/// 3. 输出: 每帧一行JSON (文件或stdout), 可选绘制PNG
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use image::{DynamicImage, RgbImage};
use mimalloc::MiMalloc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sentinel_rs::renderer::render_report;
use sentinel_rs::{
    gen_time_string, json_lines, DemoScene, FrameInput, FrameOutcome, JsonLinesStore,
    PipelineConfig, ReplayDetector, ResultStore, SessionRegistry,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// 数字卫兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "数字卫兵 - 检测结果分析", long_about = None)]
struct Args {
    /// 检测结果文件 (JSON Lines, 每行一帧的检测数组)
    #[arg(short, long, conflicts_with = "demo")]
    detections: Option<PathBuf>,

    /// 运行合成场景, 参数为帧数
    #[arg(long)]
    demo: Option<u64>,

    /// 合成场景随机种子
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// 配置文件 (不存在时按默认值创建)
    #[arg(short, long, default_value = "sentinel.json")]
    config: PathBuf,

    /// 结果输出文件 (默认 stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 绘制结果PNG的目录
    #[arg(long)]
    render_dir: Option<PathBuf>,

    /// 画布宽度
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// 画布高度
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// 会话ID
    #[arg(long, default_value = "cam-0")]
    session: String,
}

/// 统计
#[derive(Default)]
struct RunStats {
    frames: u64,
    failures: u64,
    detections: usize,
    anomalies: usize,
}

fn main() -> anyhow::Result<()> {
    // 日志输出到stderr, stdout留给结果
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = PipelineConfig::load_or_create(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    config.log_summary();

    // ========== 结果存储 ==========
    let store: Arc<dyn ResultStore> = match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("无法创建输出文件: {}", path.display()))?;
            info!(path = %path.display(), "结果写入文件");
            Arc::new(JsonLinesStore::new(BufWriter::new(file)))
        }
        None => Arc::new(JsonLinesStore::new(io::stdout())),
    };

    if let Some(dir) = &args.render_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("无法创建绘制目录: {}", dir.display()))?;
    }

    let mut registry = SessionRegistry::new(Arc::clone(&store));
    let mut stats = RunStats::default();

    info!("🚀 数字卫兵启动 ({})", gen_time_string("-"));

    match (&args.detections, args.demo) {
        (Some(path), _) => {
            // ========== 回放检测文件 ==========
            registry.register(
                args.session.clone(),
                config,
                Box::new(ReplayDetector::default()),
            )?;

            let file =
                File::open(path).with_context(|| format!("无法打开检测文件: {}", path.display()))?;
            info!(path = %path.display(), "📂 回放检测文件");

            // 坏行 (非法JSON/非UTF-8) 只记为失败帧, 读取错误才中止
            for input in json_lines(BufReader::new(file)) {
                let input = input.context("读取检测文件失败")?;
                let outcome = registry.submit(&args.session, input)?;
                handle_outcome(&args, &outcome, &mut stats)?;
            }
        }
        (None, Some(frames)) => {
            // ========== 合成场景 ==========
            let rng = StdRng::seed_from_u64(args.seed);
            let scene = DemoScene::new(rng, args.width, args.height, config.iou_threshold);
            registry.register(args.session.clone(), config, Box::new(scene))?;
            info!(frames, seed = args.seed, "🎬 合成场景演示");

            let canvas = DynamicImage::ImageRgb8(RgbImage::new(args.width, args.height));
            for _ in 0..frames {
                let outcome = registry.submit(&args.session, FrameInput::Image(canvas.clone()))?;
                handle_outcome(&args, &outcome, &mut stats)?;
            }
        }
        (None, None) => bail!("需要指定 --detections <文件> 或 --demo <帧数>"),
    }

    let summary = registry.remove(&args.session)?;
    store.flush()?;

    info!(
        frames = stats.frames,
        failures = stats.failures,
        detections = stats.detections,
        anomalies = stats.anomalies,
        tracks = summary.tracks_assigned,
        "✅ 处理完成"
    );
    Ok(())
}

fn handle_outcome(args: &Args, outcome: &FrameOutcome, stats: &mut RunStats) -> anyhow::Result<()> {
    stats.frames += 1;
    match outcome {
        Ok(report) => {
            stats.detections += report.detections.len();
            stats.anomalies += report.notable_anomalies.len();
            if let Some(dir) = &args.render_dir {
                save_render(dir, args.width, args.height, report)?;
            }
        }
        Err(failure) => {
            stats.failures += 1;
            warn!(frame = failure.frame_index, error = %failure.error, "⚠️ 跳过失败帧");
        }
    }
    Ok(())
}

fn save_render(
    dir: &Path,
    width: u32,
    height: u32,
    report: &sentinel_rs::FrameReport,
) -> anyhow::Result<()> {
    let path = dir.join(format!("frame_{:06}.png", report.frame_index));
    render_report(width, height, report)
        .save(&path)
        .with_context(|| format!("保存绘制结果失败: {}", path.display()))?;
    Ok(())
}
