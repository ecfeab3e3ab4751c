// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
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

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::EncodedFrame};

/// 接收管线产出的已编码帧
pub trait FrameSink {
  type Error;
  fn write_frame(&mut self, frame: &EncodedFrame) -> Result<(), Self::Error>;
}

pub mod draw;

mod directory_record;
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

mod mjpeg_file;
pub use self::mjpeg_file::{MjpegFileOutput, MjpegFileOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("MJPEG 文件输出错误: {0}")]
  MjpegFileOutputError(#[from] MjpegFileOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  DirectoryRecordOutput(DirectoryRecordOutput),
  MjpegFileOutput(MjpegFileOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      MjpegFileOutput::SCHEME => {
        let output = MjpegFileOutput::from_url(url)?;
        Ok(OutputWrapper::MjpegFileOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl FrameSink for OutputWrapper {
  type Error = OutputError;

  fn write_frame(&mut self, frame: &EncodedFrame) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::DirectoryRecordOutput(output) => {
        output.write_frame(frame).map_err(OutputError::from)
      }
      OutputWrapper::MjpegFileOutput(output) => output.write_frame(frame).map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_output_scheme_is_rejected() {
    let url = Url::parse("rtsp://0.0.0.0:8554/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(s)) if s == "rtsp"
    ));
  }
}
