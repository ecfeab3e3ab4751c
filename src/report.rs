// 该文件是 Shanan （山南西风） 项目的一部分。
// src/report.rs - 窗口统计报表
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

use std::fmt::Write;

use chrono::{DateTime, Local, TimeZone};

use crate::{
  clock::format_timestamp,
  storage::{AnalyticsStore, StorageError, WindowSummary},
};

pub const DEFAULT_REPORT_LIMIT: usize = 15;

#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
  pub time_key_ms: i64,
  pub stats: WindowSummary,
}

impl ReportEntry {
  pub fn recorded_at(&self) -> Option<DateTime<Local>> {
    Local.timestamp_millis_opt(self.time_key_ms).single()
  }
}

/// 最近 `limit` 个窗口，按时间先后排列
pub fn recent_windows(
  store: &dyn AnalyticsStore,
  user_id: &str,
  limit: usize,
) -> Result<Vec<ReportEntry>, StorageError> {
  let records = store.get(user_id)?;
  let skip = records.len().saturating_sub(limit);
  Ok(
    records
      .into_iter()
      .skip(skip)
      .map(|(time_key_ms, stats)| ReportEntry { time_key_ms, stats })
      .collect(),
  )
}

pub fn clear(store: &dyn AnalyticsStore, user_id: &str) -> Result<(), StorageError> {
  store.remove(user_id)
}

pub fn render_table(entries: &[ReportEntry]) -> String {
  let mut out = String::new();
  let _ = writeln!(
    out,
    "{:<20} {:<16} {:>5} {:>8} {:>8}  {:<20}",
    "window", "class", "freq", "min", "max", "first seen"
  );
  for entry in entries {
    let window = entry
      .recorded_at()
      .map(|at| format_timestamp(&at))
      .unwrap_or_else(|| entry.time_key_ms.to_string());
    for stats in entry.stats.values() {
      let _ = writeln!(
        out,
        "{:<20} {:<16} {:>5} {:>7.1}% {:>7.1}%  {:<20}",
        window,
        stats.class_label,
        stats.frequency,
        stats.min_confidence * 100.0,
        stats.max_confidence * 100.0,
        format_timestamp(&stats.window_start_time),
      );
    }
  }
  out
}
