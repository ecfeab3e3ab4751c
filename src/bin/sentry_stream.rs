// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/sentry_stream.rs - 实时监控推流
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use shanan_sentry::{
  FromUrl,
  config::{
    ClassConfig, DEFAULT_SIDE_EFFECT_QUEUE, DEFAULT_SIDE_EFFECT_WORKERS, DEFAULT_WINDOW_SECS,
    PipelineConfig, SessionContext,
  },
  frame::DEFAULT_JPEG_QUALITY,
  input::InputWrapper,
  model::DetectorWrapper,
  notify::NotifierWrapper,
  output::{OutputWrapper, draw::Annotator},
  pipeline::Pipeline,
  storage::{AnalyticsStoreWrapper, ImageStoreWrapper},
  task::{ContinuousTask, Task},
};

/// 摄像头实时监控：检测、窗口统计、威胁告警
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源，如 v4l://0 或 folder:///path/to/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 检测模型，如 yolo26:///path/model.rknn 或 replay:///path/detections.jsonl
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输出，如 mjpeg:///tmp/stream.mjpeg 或 folder:///path/to/frames
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 类别配置文件
  #[arg(long, value_name = "CLASSES", default_value = "data/detection_classes.json")]
  pub classes: PathBuf,

  /// 操作用户编号，不提供时不保存快照与统计
  #[arg(long, value_name = "USER_ID", requires_all = ["images", "analytics"])]
  pub user: Option<String>,
  /// 告警通知地址
  #[arg(long, value_name = "ADDRESS")]
  pub contact: Option<String>,

  /// 快照存储，如 folder:///var/lib/sentry
  #[arg(long, value_name = "IMAGES")]
  pub images: Option<Url>,
  /// 窗口统计存储，如 folder:///var/lib/sentry
  #[arg(long, value_name = "ANALYTICS")]
  pub analytics: Option<Url>,
  /// 告警通知方式
  #[arg(long, value_name = "NOTIFIER", default_value = "log://")]
  pub notifier: Url,

  /// 统计窗口时长（秒）
  #[arg(long, value_name = "SECONDS", default_value_t = DEFAULT_WINDOW_SECS)]
  pub window_secs: i64,
  /// 不做水平镜像
  #[arg(long)]
  pub no_mirror: bool,
  #[arg(long, value_name = "QUALITY", default_value_t = DEFAULT_JPEG_QUALITY)]
  pub jpeg_quality: u8,
  /// 标注字体（TrueType），默认尝试系统字体
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  #[arg(long, value_name = "WORKERS", default_value_t = DEFAULT_SIDE_EFFECT_WORKERS)]
  pub workers: usize,
  #[arg(long, value_name = "QUEUE", default_value_t = DEFAULT_SIDE_EFFECT_QUEUE)]
  pub queue: usize,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("检测模型: {}", args.model);
  info!("输出路径: {}", args.output);

  let classes = ClassConfig::from_path(&args.classes)?;
  let config = PipelineConfig::default()
    .with_window_secs(args.window_secs)?
    .with_mirror(!args.no_mirror)
    .with_jpeg_quality(args.jpeg_quality)
    .with_side_effects(args.workers, args.queue);
  let annotator = match &args.font {
    Some(path) => Annotator::with_font_file(path)?,
    None => Annotator::with_system_font(),
  };

  let input = InputWrapper::from_url(&args.input)?;
  let detector = DetectorWrapper::open(&args.model, &classes.catalog())?;
  let output = OutputWrapper::from_url(&args.output)?;
  let notifier = NotifierWrapper::from_url(&args.notifier)?;

  let mut builder = Pipeline::builder(input, detector)
    .with_threats(classes.threat_set())
    .with_session(SessionContext::new(args.user, args.contact))
    .with_notifier(Arc::new(notifier))
    .with_annotator(annotator)
    .with_config(config);
  if let Some(url) = &args.images {
    info!("快照存储: {}", url);
    builder = builder.with_image_store(Arc::new(ImageStoreWrapper::from_url(url)?));
  }
  if let Some(url) = &args.analytics {
    info!("统计存储: {}", url);
    builder = builder.with_analytics_store(Arc::new(AnalyticsStoreWrapper::from_url(url)?));
  }
  let pipeline = builder.build()?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .with_interrupt_handler(true)
    .run_task(pipeline, output)?;

  Ok(())
}
