// 该文件是 Shanan （山南西风） 项目的一部分。
// src/storage/memory.rs - 内存存储
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

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::storage::{AnalyticsStore, ImageStore, StorageError, WindowSummary, check_user_id};

/// 进程内存储，只在测试中使用，不能通过 URL 选用
#[derive(Debug, Default)]
pub struct MemoryImageStore {
  images: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryImageStore {
  pub fn paths(&self) -> Vec<String> {
    self
      .images
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .keys()
      .cloned()
      .collect()
  }

  pub fn image(&self, path: &str) -> Option<Vec<u8>> {
    self
      .images
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .get(path)
      .cloned()
  }
}

impl ImageStore for MemoryImageStore {
  fn put(&self, path: &str, image_bytes: &[u8]) -> Result<(), StorageError> {
    if path.is_empty() {
      return Err(StorageError::InvalidPath(path.to_string()));
    }
    self
      .images
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .insert(path.to_string(), image_bytes.to_vec());
    Ok(())
  }
}

#[derive(Debug, Default)]
pub struct MemoryAnalyticsStore {
  records: Mutex<HashMap<String, BTreeMap<i64, WindowSummary>>>,
}

impl AnalyticsStore for MemoryAnalyticsStore {
  fn set(&self, user_id: &str, time_key_ms: i64, stats: &WindowSummary) -> Result<(), StorageError> {
    check_user_id(user_id)?;
    self
      .records
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .entry(user_id.to_string())
      .or_default()
      .insert(time_key_ms, stats.clone());
    Ok(())
  }

  fn get(&self, user_id: &str) -> Result<BTreeMap<i64, WindowSummary>, StorageError> {
    Ok(
      self
        .records
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .get(user_id)
        .cloned()
        .unwrap_or_default(),
    )
  }

  fn remove(&self, user_id: &str) -> Result<(), StorageError> {
    self
      .records
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .remove(user_id);
    Ok(())
  }
}
