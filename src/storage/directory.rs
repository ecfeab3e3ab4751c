// 该文件是 Shanan （山南西风） 项目的一部分。
// src/storage/directory.rs - 本地目录存储
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
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  storage::{AnalyticsStore, ImageStore, StorageError, WindowSummary, check_user_id},
  url_local_path,
};

const ANALYTICS_DIR: &str = "analytics";

/// 图片按相对路径写入根目录：`folder:///var/lib/sentry`
pub struct DirectoryImageStore {
  root: PathBuf,
}

impl FromUrlWithScheme for DirectoryImageStore {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryImageStore {
  type Error = StorageError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StorageError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::new(url_local_path(url)))
  }
}

impl DirectoryImageStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
    let relative = Path::new(path);
    let normal = relative
      .components()
      .all(|c| matches!(c, Component::Normal(_)));
    if path.is_empty() || !normal {
      return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(self.root.join(relative))
  }
}

impl ImageStore for DirectoryImageStore {
  fn put(&self, path: &str, image_bytes: &[u8]) -> Result<(), StorageError> {
    let target = self.resolve(path)?;
    if let Some(parent) = target.parent() {
      std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&target, image_bytes)?;
    info!("图片已保存: {}", target.display());
    Ok(())
  }
}

/// 每个用户一个 JSON 文档：`{root}/analytics/{user_id}.json`
pub struct DirectoryAnalyticsStore {
  root: PathBuf,
  // 读-改-写期间串行化，防止多个工作线程互相覆盖
  lock: Mutex<()>,
}

impl FromUrlWithScheme for DirectoryAnalyticsStore {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryAnalyticsStore {
  type Error = StorageError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StorageError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::new(url_local_path(url)))
  }
}

impl DirectoryAnalyticsStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      lock: Mutex::new(()),
    }
  }

  fn document(&self, user_id: &str) -> Result<PathBuf, StorageError> {
    check_user_id(user_id)?;
    Ok(
      self
        .root
        .join(ANALYTICS_DIR)
        .join(format!("{}.json", user_id)),
    )
  }

  fn load(path: &Path) -> Result<BTreeMap<i64, WindowSummary>, StorageError> {
    match std::fs::read(path) {
      Ok(data) => Ok(serde_json::from_slice(&data)?),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
      Err(e) => Err(e.into()),
    }
  }
}

impl AnalyticsStore for DirectoryAnalyticsStore {
  fn set(&self, user_id: &str, time_key_ms: i64, stats: &WindowSummary) -> Result<(), StorageError> {
    let path = self.document(user_id)?;
    let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());

    let mut records = Self::load(&path)?;
    records.insert(time_key_ms, stats.clone());

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    // 先写临时文件再改名，避免中途失败留下半个文档
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(&records)?)?;
    std::fs::rename(&tmp, &path)?;

    debug!("统计已写入: {} @ {}", path.display(), time_key_ms);
    Ok(())
  }

  fn get(&self, user_id: &str) -> Result<BTreeMap<i64, WindowSummary>, StorageError> {
    let path = self.document(user_id)?;
    let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
    Self::load(&path)
  }

  fn remove(&self, user_id: &str) -> Result<(), StorageError> {
    let path = self.document(user_id)?;
    let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
    match std::fs::remove_file(&path) {
      Ok(()) => {
        info!("已清除用户 {} 的统计记录", user_id);
        Ok(())
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }
}
