// 该文件是 Shanan （山南西风） 项目的一部分。
// src/lib.rs - 库主文件
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

//! # Shanan Sentry
//!
//! 摄像头实时监控管线：逐帧检测、按固定时间窗口聚合统计、
//! 每个窗口至多一次告警（快照 + 通知），并周期性持久化窗口统计。
//!
//! 数据流：
//!
//! ```text
//! 视频源 -> 检测器 -> (窗口聚合, 画框标注, 告警分发) -> 编码帧输出
//!                         |
//!                         +-- 窗口结束 -> 统计持久化
//! ```
//!
//! 慢速副作用（快照上传、通知发送、统计写入）全部交给有界工作线程池，
//! 主循环从不等待它们完成。

use std::path::PathBuf;

pub mod aggregate;
pub mod alert;
pub mod capture;
pub mod clock;
pub mod config;
pub mod frame;
pub mod input;
pub mod model;
pub mod notify;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod task;
pub mod worker;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 将 URL 中的路径部分解码为本地路径（处理 `%20` 等转义）
pub fn url_local_path(url: &url::Url) -> PathBuf {
  match urlencoding::decode(url.path()) {
    Ok(path) => PathBuf::from(path.into_owned()),
    Err(_) => PathBuf::from(url.path()),
  }
}
