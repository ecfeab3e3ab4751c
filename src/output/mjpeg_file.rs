// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/mjpeg_file.rs - multipart MJPEG 文件输出
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

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme, frame::EncodedFrame, output::FrameSink, url_local_path,
};

#[derive(Error, Debug)]
pub enum MjpegFileOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 把帧按 `multipart/x-mixed-replace` 分段依次追加到文件：`mjpeg:///tmp/stream.mjpeg`
///
/// 文件内容与 HTTP 推流的响应体一致，可直接转发。
pub struct MjpegFileOutput {
  path: PathBuf,
  writer: BufWriter<File>,
}

impl FromUrlWithScheme for MjpegFileOutput {
  const SCHEME: &'static str = "mjpeg";
}

impl FromUrl for MjpegFileOutput {
  type Error = MjpegFileOutputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(MjpegFileOutputError::SchemeMismatch);
    }
    Self::create(url_local_path(url))
  }
}

impl MjpegFileOutput {
  pub fn create(path: impl Into<PathBuf>) -> Result<Self, MjpegFileOutputError> {
    let path = path.into();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(&path)?);
    info!("MJPEG 输出: {} ({})", path.display(), EncodedFrame::stream_content_type());
    Ok(Self { path, writer })
  }
}

impl FrameSink for MjpegFileOutput {
  type Error = MjpegFileOutputError;

  fn write_frame(&mut self, frame: &EncodedFrame) -> Result<(), Self::Error> {
    self.writer.write_all(&frame.to_multipart_part())?;
    self.writer.flush()?;
    Ok(())
  }
}

impl Drop for MjpegFileOutput {
  fn drop(&mut self) {
    if self.writer.flush().is_ok() {
      info!("MJPEG 输出已关闭: {}", self.path.display());
    }
  }
}
