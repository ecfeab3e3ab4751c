// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像输入
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
use thiserror::Error;

use crate::FromUrl;

/// 帧来源
///
/// 由单个管线独占。`read` 返回 `Ok(None)` 表示来源已耗尽；
/// `release` 释放底层设备，之后不再产生帧。
pub trait FrameSource {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError>;

  fn release(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
    (**self).read()
  }

  fn release(&mut self) {
    (**self).release()
  }
}

mod image_sequence;
pub use self::image_sequence::{ImageSequenceInput, ImageSequenceInputError};

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::{V4lInput, V4lInputError, probe_cameras};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image sequence input error: {0}")]
  ImageSequenceInputError(#[from] ImageSequenceInputError),
  #[cfg(feature = "v4l_input")]
  #[error("V4L input error: {0}")]
  V4lInputError(#[from] V4lInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  ImageSequence(ImageSequenceInput),
  #[cfg(feature = "v4l_input")]
  V4l(V4lInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    use crate::FromUrlWithScheme;

    #[cfg(feature = "v4l_input")]
    {
      if url.scheme() == V4lInput::SCHEME {
        let input = V4lInput::from_url(url)?;
        return Ok(InputWrapper::V4l(input));
      }
    }

    if url.scheme() == ImageSequenceInput::SCHEME {
      let input = ImageSequenceInput::from_url(url)?;
      return Ok(InputWrapper::ImageSequence(input));
    }

    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl FrameSource for InputWrapper {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
    match self {
      InputWrapper::ImageSequence(input) => input.read(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.read(),
    }
  }

  fn release(&mut self) {
    match self {
      InputWrapper::ImageSequence(input) => input.release(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4l(input) => input.release(),
    }
  }
}
