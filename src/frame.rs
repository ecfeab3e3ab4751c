// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 帧变换与编码
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

use std::io::Cursor;

use image::{ImageFormat, ImageResult, RgbImage, codecs::jpeg::JpegEncoder};

/// multipart 流使用的分隔符
pub const MULTIPART_BOUNDARY: &str = "frame";
pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// 编码后的单帧图像，可独立解码
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
  /// 帧序号，从 1 开始
  pub index: u64,
  pub content_type: &'static str,
  pub bytes: Vec<u8>,
}

impl EncodedFrame {
  /// `multipart/x-mixed-replace` 响应头
  pub fn stream_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={}", MULTIPART_BOUNDARY)
  }

  /// 封装为一个 multipart 分段
  pub fn to_multipart_part(&self) -> Vec<u8> {
    let header = format!(
      "--{}\r\nContent-Type: {}\r\n\r\n",
      MULTIPART_BOUNDARY, self.content_type
    );
    let mut part = Vec::with_capacity(header.len() + self.bytes.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(&self.bytes);
    part.extend_from_slice(b"\r\n");
    part
  }
}

/// 水平镜像（显示约定）
pub fn mirror_in_place(frame: &mut RgbImage) {
  image::imageops::flip_horizontal_in_place(frame);
}

pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> ImageResult<Vec<u8>> {
  let mut bytes = Vec::new();
  let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
  encoder.encode_image(frame)?;
  Ok(bytes)
}

pub fn encode_png(frame: &RgbImage) -> ImageResult<Vec<u8>> {
  let mut cursor = Cursor::new(Vec::new());
  frame.write_to(&mut cursor, ImageFormat::Png)?;
  Ok(cursor.into_inner())
}
