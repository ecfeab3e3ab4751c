// 该文件是 Shanan （山南西风） 项目的一部分。
// src/storage.rs - 图片与统计存储
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

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, aggregate::WindowStats, clock::format_timestamp};

/// 一个窗口的统计结果：类别标签 -> 统计
pub type WindowSummary = BTreeMap<String, WindowStats>;

#[derive(Error, Debug)]
pub enum StorageError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("非法存储路径: {0}")]
  InvalidPath(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCategory {
  /// 告警快照
  Records,
  /// 手动抓拍
  Captures,
}

impl ImageCategory {
  pub fn as_str(&self) -> &'static str {
    match self {
      ImageCategory::Records => "records",
      ImageCategory::Captures => "captures",
    }
  }
}

impl fmt::Display for ImageCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// `"{user_id}/{category}/{timestamp}.png"`
pub fn image_path(user_id: &str, category: ImageCategory, at: &DateTime<Local>) -> String {
  format!("{}/{}/{}.png", user_id, category, format_timestamp(at))
}

pub trait ImageStore: Send + Sync {
  fn put(&self, path: &str, image_bytes: &[u8]) -> Result<(), StorageError>;
}

pub trait AnalyticsStore: Send + Sync {
  fn set(&self, user_id: &str, time_key_ms: i64, stats: &WindowSummary) -> Result<(), StorageError>;

  /// 没有记录时返回空表
  fn get(&self, user_id: &str) -> Result<BTreeMap<i64, WindowSummary>, StorageError>;

  fn remove(&self, user_id: &str) -> Result<(), StorageError>;
}

mod directory;
mod memory;

pub use self::directory::{DirectoryAnalyticsStore, DirectoryImageStore};
pub use self::memory::{MemoryAnalyticsStore, MemoryImageStore};

/// 用户编号会成为路径的一部分，不允许出现分隔符
pub(crate) fn check_user_id(user_id: &str) -> Result<(), StorageError> {
  if user_id.is_empty()
    || user_id == "."
    || user_id == ".."
    || user_id.contains(['/', '\\'])
  {
    return Err(StorageError::InvalidPath(user_id.to_string()));
  }
  Ok(())
}

pub enum ImageStoreWrapper {
  Directory(DirectoryImageStore),
}

impl FromUrl for ImageStoreWrapper {
  type Error = StorageError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      DirectoryImageStore::SCHEME => Ok(ImageStoreWrapper::Directory(
        DirectoryImageStore::from_url(url)?,
      )),
      other => Err(StorageError::SchemeMismatch(other.to_string())),
    }
  }
}

impl ImageStore for ImageStoreWrapper {
  fn put(&self, path: &str, image_bytes: &[u8]) -> Result<(), StorageError> {
    match self {
      ImageStoreWrapper::Directory(store) => store.put(path, image_bytes),
    }
  }
}

pub enum AnalyticsStoreWrapper {
  Directory(DirectoryAnalyticsStore),
}

impl FromUrl for AnalyticsStoreWrapper {
  type Error = StorageError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      DirectoryAnalyticsStore::SCHEME => Ok(AnalyticsStoreWrapper::Directory(
        DirectoryAnalyticsStore::from_url(url)?,
      )),
      other => Err(StorageError::SchemeMismatch(other.to_string())),
    }
  }
}

impl AnalyticsStore for AnalyticsStoreWrapper {
  fn set(&self, user_id: &str, time_key_ms: i64, stats: &WindowSummary) -> Result<(), StorageError> {
    match self {
      AnalyticsStoreWrapper::Directory(store) => store.set(user_id, time_key_ms, stats),
    }
  }

  fn get(&self, user_id: &str) -> Result<BTreeMap<i64, WindowSummary>, StorageError> {
    match self {
      AnalyticsStoreWrapper::Directory(store) => store.get(user_id),
    }
  }

  fn remove(&self, user_id: &str) -> Result<(), StorageError> {
    match self {
      AnalyticsStoreWrapper::Directory(store) => store.remove(user_id),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn image_path_is_keyed_by_user_category_and_time() {
    let at = Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    assert_eq!(
      image_path("u-42", ImageCategory::Records, &at),
      "u-42/records/2026-01-02 03:04:05.png"
    );
    assert_eq!(
      image_path("u-42", ImageCategory::Captures, &at),
      "u-42/captures/2026-01-02 03:04:05.png"
    );
  }

  #[test]
  fn user_ids_with_separators_are_rejected() {
    assert!(check_user_id("alice").is_ok());
    assert!(check_user_id("").is_err());
    assert!(check_user_id("..").is_err());
    assert!(check_user_id("a/b").is_err());
  }

  #[test]
  fn wrappers_dispatch_on_scheme() {
    let folder = Url::parse("folder:///var/lib/sentry").unwrap();
    assert!(matches!(
      ImageStoreWrapper::from_url(&folder),
      Ok(ImageStoreWrapper::Directory(_))
    ));
    assert!(matches!(
      AnalyticsStoreWrapper::from_url(&folder),
      Ok(AnalyticsStoreWrapper::Directory(_))
    ));

    // 内存存储只用于测试，不能通过 URL 选用
    let memory = Url::parse("memory://").unwrap();
    assert!(matches!(
      ImageStoreWrapper::from_url(&memory),
      Err(StorageError::SchemeMismatch(_))
    ));
    assert!(matches!(
      AnalyticsStoreWrapper::from_url(&memory),
      Err(StorageError::SchemeMismatch(_))
    ));

    let s3 = Url::parse("s3://bucket/prefix").unwrap();
    assert!(matches!(
      ImageStoreWrapper::from_url(&s3),
      Err(StorageError::SchemeMismatch(_))
    ));
  }
}
