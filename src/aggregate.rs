// 该文件是 Shanan （山南西风） 项目的一部分。
// src/aggregate.rs - 时间窗口统计
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

//! 按固定时长的窗口累积各类别的检测统计。
//!
//! 频次取窗口内单帧最大计数，而不是累加。

use std::collections::BTreeMap;

use chrono::{DateTime, Local, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{model::Detection, storage::WindowSummary};

/// 一个类别在当前窗口内的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
  pub class_label: String,
  #[serde(rename = "freq")]
  pub frequency: u32,
  pub max_confidence: f32,
  pub min_confidence: f32,
  #[serde(rename = "time")]
  pub window_start_time: DateTime<Local>,
}

impl WindowStats {
  fn first_seen(class_label: &str, count: u32, confidence: f32, at: DateTime<Local>) -> Self {
    Self {
      class_label: class_label.to_string(),
      frequency: count,
      max_confidence: confidence,
      min_confidence: confidence,
      window_start_time: at,
    }
  }

  fn absorb(&mut self, count: u32, confidence: f32) {
    self.frequency = self.frequency.max(count);
    self.max_confidence = self.max_confidence.max(confidence);
    self.min_confidence = self.min_confidence.min(confidence);
  }
}

/// 固定节拍的窗口边界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
  duration: TimeDelta,
  next_boundary: DateTime<Local>,
}

impl Window {
  pub fn starting_at(start: DateTime<Local>, duration: TimeDelta) -> Self {
    Self {
      duration,
      next_boundary: start + duration,
    }
  }

  pub fn duration(&self) -> TimeDelta {
    self.duration
  }

  pub fn next_boundary(&self) -> DateTime<Local> {
    self.next_boundary
  }

  pub fn elapsed(&self, at: DateTime<Local>) -> bool {
    at >= self.next_boundary
  }

  /// 只前进一个时长，不对齐到当前时间
  pub fn advance(&mut self) {
    self.next_boundary += self.duration;
  }
}

#[derive(Debug)]
pub struct WindowAggregator {
  window: Window,
  stats: WindowSummary,
}

impl WindowAggregator {
  pub fn new(start: DateTime<Local>, duration: TimeDelta) -> Self {
    Self {
      window: Window::starting_at(start, duration),
      stats: WindowSummary::new(),
    }
  }

  /// 单个检测结果按一帧处理
  pub fn record(&mut self, detection: &Detection, at: DateTime<Local>) {
    self.record_frame(std::slice::from_ref(detection), at);
  }

  pub fn record_frame(&mut self, detections: &[Detection], at: DateTime<Local>) {
    let mut per_class: BTreeMap<&str, (u32, f32, f32)> = BTreeMap::new();
    for d in detections.iter().filter(|d| d.is_qualifying()) {
      let entry = per_class
        .entry(d.class_label.as_str())
        .or_insert((0, d.confidence, d.confidence));
      entry.0 += 1;
      entry.1 = entry.1.max(d.confidence);
      entry.2 = entry.2.min(d.confidence);
    }

    for (label, (count, max, min)) in per_class {
      match self.stats.get_mut(label) {
        Some(stats) => {
          stats.absorb(count, max);
          stats.absorb(count, min);
        }
        None => {
          let mut stats = WindowStats::first_seen(label, count, max, at);
          stats.absorb(count, min);
          self.stats.insert(label.to_string(), stats);
        }
      }
    }
  }

  pub fn window_elapsed(&self, at: DateTime<Local>) -> bool {
    self.window.elapsed(at)
  }

  /// 取出当前窗口的统计并清空，边界前进一个时长
  pub fn flush(&mut self, at: DateTime<Local>) -> WindowSummary {
    let stats = std::mem::take(&mut self.stats);
    self.window.advance();
    debug!(
      "窗口结束于 {}: {} 个类别，下一边界 {}",
      at,
      stats.len(),
      self.window.next_boundary()
    );
    stats
  }

  pub fn stats(&self) -> &WindowSummary {
    &self.stats
  }

  pub fn next_boundary(&self) -> DateTime<Local> {
    self.window.next_boundary()
  }
}
