// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 监控管线
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

//! 逐帧驱动：读帧、检测、标注、告警、窗口统计、编码。
//!
//! [`Pipeline`] 是已编码帧的迭代器。帧源结束、读帧失败或检测器失败时
//! 进入 [`PipelineState::Stopped`]，此后不再产出。帧源在任何退出路径上
//! 恰好释放一次。
//!
//! 析构时先释放帧源，再等待已提交的快照、通知与统计任务完成。
//! 存储或通知较慢时，析构所在线程会相应阻塞。

use std::sync::Arc;

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  aggregate::WindowAggregator,
  alert::{AlertDispatcher, AlertOutcome},
  clock::{Clock, SystemClock},
  config::{PipelineConfig, SessionContext, ThreatClassSet},
  frame::{EncodedFrame, JPEG_CONTENT_TYPE, encode_jpeg, mirror_in_place},
  input::{FrameSource, InputError},
  model::{Detection, Detector, DetectorError},
  notify::{LogNotifier, Notifier},
  output::draw::Annotator,
  storage::{AnalyticsStore, ImageStore, WindowSummary},
  worker::{SideEffectQueue, WorkerError, WorkerPool},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("读帧失败: {0}")]
  Input(#[from] InputError),
  #[error("检测失败: {0}")]
  Detector(#[from] DetectorError),
  #[error("帧编码失败: {0}")]
  Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Running,
  Stopped,
}

pub struct PipelineBuilder<S, D> {
  source: S,
  detector: D,
  threats: Arc<ThreatClassSet>,
  session: SessionContext,
  images: Option<Arc<dyn ImageStore>>,
  analytics: Option<Arc<dyn AnalyticsStore>>,
  notifier: Arc<dyn Notifier>,
  annotator: Annotator,
  clock: Box<dyn Clock>,
  config: PipelineConfig,
}

impl<S: FrameSource, D: Detector> PipelineBuilder<S, D> {
  pub fn with_threats(mut self, threats: ThreatClassSet) -> Self {
    self.threats = Arc::new(threats);
    self
  }

  pub fn with_session(mut self, session: SessionContext) -> Self {
    self.session = session;
    self
  }

  pub fn with_image_store(mut self, images: Arc<dyn ImageStore>) -> Self {
    self.images = Some(images);
    self
  }

  pub fn with_analytics_store(mut self, analytics: Arc<dyn AnalyticsStore>) -> Self {
    self.analytics = Some(analytics);
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn with_annotator(mut self, annotator: Annotator) -> Self {
    self.annotator = annotator;
    self
  }

  pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
    self.clock = Box::new(clock);
    self
  }

  pub fn with_config(mut self, config: PipelineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn build(self) -> Result<Pipeline<S, D>, WorkerError> {
    let pool = WorkerPool::new(self.config.side_effect_workers, self.config.side_effect_queue)?;
    let queue = pool.queue();
    let dispatcher = AlertDispatcher::new(
      Arc::clone(&self.threats),
      self.session.clone(),
      self.images,
      self.notifier,
      queue.clone(),
    );

    info!(
      "管线已创建: 窗口 {} 秒, 威胁类别 {} 个, 用户 {}",
      self.config.window.num_seconds(),
      self.threats.len(),
      self.session.user_id().unwrap_or("<匿名>")
    );

    Ok(Pipeline {
      state: PipelineState::Running,
      source: self.source,
      detector: self.detector,
      aggregator: None,
      dispatcher,
      annotator: self.annotator,
      threats: self.threats,
      session: self.session,
      analytics: self.analytics,
      clock: self.clock,
      config: self.config,
      frame_index: 0,
      queue,
      released: false,
      _pool: pool,
    })
  }
}

pub struct Pipeline<S: FrameSource, D: Detector> {
  state: PipelineState,
  source: S,
  detector: D,
  // 首次取帧时以当时的时间作为会话起点
  aggregator: Option<WindowAggregator>,
  dispatcher: AlertDispatcher,
  annotator: Annotator,
  threats: Arc<ThreatClassSet>,
  session: SessionContext,
  analytics: Option<Arc<dyn AnalyticsStore>>,
  clock: Box<dyn Clock>,
  config: PipelineConfig,
  frame_index: u64,
  queue: SideEffectQueue,
  released: bool,
  // 最后析构：等待已提交的任务完成
  _pool: WorkerPool,
}

impl<S: FrameSource, D: Detector> Pipeline<S, D> {
  pub fn builder(source: S, detector: D) -> PipelineBuilder<S, D> {
    PipelineBuilder {
      source,
      detector,
      threats: Arc::new(ThreatClassSet::default()),
      session: SessionContext::anonymous(),
      images: None,
      analytics: None,
      notifier: Arc::new(LogNotifier),
      annotator: Annotator::new(),
      clock: Box::new(SystemClock),
      config: PipelineConfig::default(),
    }
  }

  pub fn state(&self) -> PipelineState {
    self.state
  }

  /// 会话尚未开始时为 `None`
  pub fn next_boundary(&self) -> Option<DateTime<Local>> {
    self.aggregator.as_ref().map(|a| a.next_boundary())
  }

  fn stop(&mut self) {
    self.state = PipelineState::Stopped;
    self.release_source();
  }

  fn release_source(&mut self) {
    if !self.released {
      self.released = true;
      self.source.release();
    }
  }

  fn step(&mut self) -> Result<Option<EncodedFrame>, PipelineError> {
    let now = self.clock.now();
    let Some(mut frame) = self.source.read()? else {
      return Ok(None);
    };
    if self.config.mirror {
      mirror_in_place(&mut frame);
    }
    self.frame_index += 1;

    let detections = self
      .detector
      .classify(&frame)?
      .into_iter()
      .filter(|d| match d.validate() {
        Ok(()) => true,
        Err(e) => {
          warn!("丢弃无效检测结果: {}", e);
          false
        }
      })
      .collect::<Vec<Detection>>();
    debug!("第 {} 帧: {} 个检测结果", self.frame_index, detections.len());

    for detection in &detections {
      self.annotator.annotate(&mut frame, detection, &self.threats);
      if self.threats.contains(&detection.class_label)
        && self.dispatcher.consider(detection, &frame, now) == AlertOutcome::Dispatched
      {
        debug!("第 {} 帧发出告警", self.frame_index);
      }
    }

    let window = self.config.window;
    let aggregator = self
      .aggregator
      .get_or_insert_with(|| WindowAggregator::new(now, window));
    aggregator.record_frame(&detections, now);

    if aggregator.window_elapsed(now) {
      let summary = aggregator.flush(now);
      self.dispatcher.reset();
      self.persist_window(summary, now);
    }

    let bytes = encode_jpeg(&frame, self.config.jpeg_quality)?;
    Ok(Some(EncodedFrame {
      index: self.frame_index,
      content_type: JPEG_CONTENT_TYPE,
      bytes,
    }))
  }

  fn persist_window(&self, summary: WindowSummary, at: DateTime<Local>) {
    if summary.is_empty() {
      return;
    }
    let Some(user_id) = self.session.user_id() else {
      debug!("未指定用户，窗口统计不保存");
      return;
    };
    let Some(analytics) = &self.analytics else {
      debug!("未配置统计存储，窗口统计不保存");
      return;
    };

    let user_id = user_id.to_string();
    let key = at.timestamp_millis();
    let analytics = Arc::clone(analytics);
    let result = self.queue.submit("analytics", move || {
      analytics.set(&user_id, key, &summary)?;
      Ok(())
    });
    if let Err(e) = result {
      warn!("窗口统计未提交: {}", e);
    }
  }
}

impl<S: FrameSource, D: Detector> Iterator for Pipeline<S, D> {
  type Item = EncodedFrame;

  fn next(&mut self) -> Option<Self::Item> {
    while self.state == PipelineState::Running {
      match self.step() {
        Ok(Some(frame)) => return Some(frame),
        Ok(None) => {
          info!("帧源已结束，共 {} 帧", self.frame_index);
          self.stop();
        }
        Err(PipelineError::Encode(e)) => {
          warn!("第 {} 帧编码失败，跳过: {}", self.frame_index, e);
        }
        Err(e) => {
          error!("管线终止: {}", e);
          self.stop();
        }
      }
    }
    None
  }
}

impl<S: FrameSource, D: Detector> Drop for Pipeline<S, D> {
  fn drop(&mut self) {
    self.state = PipelineState::Stopped;
    self.release_source();
  }
}
