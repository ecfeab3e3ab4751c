// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 检测模型适配
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

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, config::ClassCatalog};

/// 置信度不低于该值的检测结果才参与统计、标注与告警
pub const QUALIFYING_CONFIDENCE: f32 = 0.5;

/// 单帧中的一个检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub class_label: String,
  pub confidence: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，像素坐标
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidDetection {
  #[error("类别标签为空")]
  EmptyLabel,
  #[error("置信度超出 [0, 1] 范围: {0}")]
  Confidence(f32),
  #[error("边界框无效: {0:?}")]
  BoundingBox([f32; 4]),
}

impl Detection {
  pub fn new(class_label: impl Into<String>, confidence: f32, bbox: [f32; 4]) -> Self {
    Self {
      class_label: class_label.into(),
      confidence,
      bbox,
    }
  }

  pub fn is_qualifying(&self) -> bool {
    self.confidence >= QUALIFYING_CONFIDENCE
  }

  pub fn validate(&self) -> Result<(), InvalidDetection> {
    if self.class_label.is_empty() {
      return Err(InvalidDetection::EmptyLabel);
    }
    if !(0.0..=1.0).contains(&self.confidence) {
      return Err(InvalidDetection::Confidence(self.confidence));
    }
    let [x_min, y_min, x_max, y_max] = self.bbox;
    if self.bbox.iter().any(|v| !v.is_finite()) || x_min > x_max || y_min > y_max {
      return Err(InvalidDetection::BoundingBox(self.bbox));
    }
    Ok(())
  }
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("检测模型不可用: {0}")]
  Unavailable(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("回放文件第 {line} 行解析失败: {source}")]
  Replay {
    line: usize,
    #[source]
    source: serde_json::Error,
  },
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[cfg(feature = "model_yolo26")]
  #[error("YOLO26 模型错误: {0}")]
  Yolo26(#[from] Yolo26Error),
}

/// 检测器适配层，不得修改输入帧
pub trait Detector {
  fn classify(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
  fn classify(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
    (**self).classify(frame)
  }
}

mod replay;
pub use self::replay::ReplayDetector;

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};

pub enum DetectorWrapper {
  Replay(ReplayDetector),
  #[cfg(feature = "model_yolo26")]
  Yolo26(Yolo26),
}

impl DetectorWrapper {
  /// 根据 URL 方案打开检测器，类别表用于把模型输出的类别编号映射为标签
  #[cfg_attr(not(feature = "model_yolo26"), allow(unused_variables))]
  pub fn open(url: &Url, catalog: &ClassCatalog) -> Result<Self, DetectorError> {
    match url.scheme() {
      ReplayDetector::SCHEME => Ok(DetectorWrapper::Replay(ReplayDetector::from_url(url)?)),
      #[cfg(feature = "model_yolo26")]
      Yolo26Builder::SCHEME => {
        let model = Yolo26Builder::from_url(url)?.build(catalog.clone())?;
        Ok(DetectorWrapper::Yolo26(model))
      }
      other => Err(DetectorError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Detector for DetectorWrapper {
  fn classify(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
    match self {
      DetectorWrapper::Replay(detector) => detector.classify(frame),
      #[cfg(feature = "model_yolo26")]
      DetectorWrapper::Yolo26(detector) => detector.classify(frame),
    }
  }
}
