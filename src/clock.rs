// 该文件是 Shanan （山南西风） 项目的一部分。
// src/clock.rs - 时钟
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

use std::cell::Cell;

use chrono::{DateTime, Local, TimeDelta};

/// 快照文件名与告警正文中使用的时间格式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_timestamp(at: &DateTime<Local>) -> String {
  at.format(TIMESTAMP_FORMAT).to_string()
}

pub trait Clock: Send {
  fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Local> {
    Local::now()
  }
}

/// 每次读取前进固定步长的时钟，用于回放与测试
#[derive(Debug)]
pub struct SteppingClock {
  current: Cell<DateTime<Local>>,
  step: TimeDelta,
}

impl SteppingClock {
  pub fn new(start: DateTime<Local>, step: TimeDelta) -> Self {
    Self {
      current: Cell::new(start),
      step,
    }
  }
}

impl Clock for SteppingClock {
  fn now(&self) -> DateTime<Local> {
    let now = self.current.get();
    self.current.set(now + self.step);
    now
  }
}
