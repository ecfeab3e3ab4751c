// 该文件是 Shanan （山南西风） 项目的一部分。
// src/capture.rs - 手动抓拍
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

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Local};
use image::RgbImage;
use thiserror::Error;
use tracing::info;

use crate::{
  frame::encode_png,
  storage::{ImageCategory, ImageStore, StorageError, image_path},
};

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("data URL 缺少数据段")]
  MissingPayload,
  #[error("Base64 解码失败: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("图像解码失败: {0}")]
  Image(#[from] image::ImageError),
  #[error("存储失败: {0}")]
  Storage(#[from] StorageError),
}

/// 解析 `data:image/png;base64,....`，只取逗号之后的部分
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, CaptureError> {
  let (_, payload) = data_url
    .split_once(',')
    .ok_or(CaptureError::MissingPayload)?;
  let payload = payload.trim();
  if payload.is_empty() {
    return Err(CaptureError::MissingPayload);
  }
  Ok(STANDARD.decode(payload)?)
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, CaptureError> {
  Ok(image::load_from_memory(bytes)?.into_rgb8())
}

/// 重新编码为 PNG 并保存到 `{user_id}/captures/{timestamp}.png`，返回存储路径
pub fn store_capture(
  store: &dyn ImageStore,
  user_id: &str,
  image: &RgbImage,
  at: &DateTime<Local>,
) -> Result<String, CaptureError> {
  let path = image_path(user_id, ImageCategory::Captures, at);
  let bytes = encode_png(image)?;
  store.put(&path, &bytes)?;
  info!("抓拍已保存: {} ({}x{})", path, image.width(), image.height());
  Ok(path)
}
