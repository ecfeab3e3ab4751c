// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 类别配置与管线参数
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

use std::collections::HashSet;
use std::path::Path;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::frame::DEFAULT_JPEG_QUALITY;

pub const DEFAULT_WINDOW_SECS: i64 = 30;
pub const DEFAULT_SIDE_EFFECT_WORKERS: usize = 2;
pub const DEFAULT_SIDE_EFFECT_QUEUE: usize = 16;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON 解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("窗口时长必须为正数: {0} 秒")]
  InvalidWindow(i64),
}

/// 类别配置文件
///
/// ```json
/// { "class_names": ["person", "knife"], "threat_objects": ["knife"] }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassConfig {
  pub class_names: Vec<String>,
  #[serde(default)]
  pub threat_objects: Vec<String>,
}

impl ClassConfig {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    info!("加载类别配置: {}", path.display());
    let data = std::fs::read_to_string(path)?;
    Self::from_json_str(&data)
  }

  pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
    let config: ClassConfig = serde_json::from_str(data)?;
    for threat in &config.threat_objects {
      if !config.class_names.contains(threat) {
        warn!("威胁类别 '{}' 不在类别列表中", threat);
      }
    }
    Ok(config)
  }

  pub fn catalog(&self) -> ClassCatalog {
    ClassCatalog {
      names: self.class_names.clone(),
    }
  }

  pub fn threat_set(&self) -> ThreatClassSet {
    self.threat_objects.iter().cloned().collect()
  }
}

/// 模型类别编号到标签的映射
#[derive(Debug, Clone, Default)]
pub struct ClassCatalog {
  names: Vec<String>,
}

impl ClassCatalog {
  pub fn label(&self, class_id: u32) -> Option<&str> {
    self.names.get(class_id as usize).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

/// 安全相关（威胁）类别集合，启动时加载，之后不可变
#[derive(Debug, Clone, Default)]
pub struct ThreatClassSet {
  labels: HashSet<String>,
}

impl ThreatClassSet {
  pub fn contains(&self, label: &str) -> bool {
    self.labels.contains(label)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }
}

impl<S: Into<String>> FromIterator<S> for ThreatClassSet {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      labels: iter.into_iter().map(Into::into).collect(),
    }
  }
}

/// 当前会话的操作用户，显式传入管线
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
  user_id: Option<String>,
  contact: Option<String>,
}

impl SessionContext {
  /// 空字符串视为未提供
  pub fn new(user_id: Option<String>, contact: Option<String>) -> Self {
    Self {
      user_id: user_id.filter(|id| !id.trim().is_empty()),
      contact: contact.filter(|addr| !addr.trim().is_empty()),
    }
  }

  pub fn anonymous() -> Self {
    Self::default()
  }

  pub fn user_id(&self) -> Option<&str> {
    self.user_id.as_deref()
  }

  pub fn contact(&self) -> Option<&str> {
    self.contact.as_deref()
  }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  pub window: TimeDelta,
  pub mirror: bool,
  pub jpeg_quality: u8,
  pub side_effect_workers: usize,
  pub side_effect_queue: usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      window: TimeDelta::seconds(DEFAULT_WINDOW_SECS),
      mirror: true,
      jpeg_quality: DEFAULT_JPEG_QUALITY,
      side_effect_workers: DEFAULT_SIDE_EFFECT_WORKERS,
      side_effect_queue: DEFAULT_SIDE_EFFECT_QUEUE,
    }
  }
}

impl PipelineConfig {
  pub fn with_window_secs(mut self, secs: i64) -> Result<Self, ConfigError> {
    if secs <= 0 {
      return Err(ConfigError::InvalidWindow(secs));
    }
    self.window = TimeDelta::seconds(secs);
    Ok(self)
  }

  pub fn with_mirror(mut self, mirror: bool) -> Self {
    self.mirror = mirror;
    self
  }

  pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
    self.jpeg_quality = quality;
    self
  }

  pub fn with_side_effects(mut self, workers: usize, queue: usize) -> Self {
    self.side_effect_workers = workers;
    self.side_effect_queue = queue;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn class_config_builds_catalog_and_threats() {
    let config = ClassConfig::from_json_str(
      r#"{ "class_names": ["person", "car", "knife"], "threat_objects": ["knife"] }"#,
    )
    .unwrap();

    let catalog = config.catalog();
    assert_eq!(catalog.label(0), Some("person"));
    assert_eq!(catalog.label(2), Some("knife"));
    assert_eq!(catalog.label(3), None);

    let threats = config.threat_set();
    assert!(threats.contains("knife"));
    assert!(!threats.contains("person"));
    assert_eq!(threats.len(), 1);
  }

  #[test]
  fn threat_objects_are_optional() {
    let config = ClassConfig::from_json_str(r#"{ "class_names": ["person"] }"#).unwrap();
    assert!(config.threat_set().is_empty());
  }

  #[test]
  fn bundled_class_file_parses() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/detection_classes.json");
    let config = ClassConfig::from_path(path).unwrap();
    assert_eq!(config.catalog().len(), 80);
    assert!(config.threat_set().contains("knife"));
  }

  #[test]
  fn session_context_ignores_blank_values() {
    let session = SessionContext::new(Some("".into()), Some("ops@example.com".into()));
    assert_eq!(session.user_id(), None);
    assert_eq!(session.contact(), Some("ops@example.com"));
  }

  #[test]
  fn window_must_be_positive() {
    assert!(matches!(
      PipelineConfig::default().with_window_secs(0),
      Err(ConfigError::InvalidWindow(0))
    ));
    let config = PipelineConfig::default().with_window_secs(5).unwrap();
    assert_eq!(config.window, TimeDelta::seconds(5));
  }
}
