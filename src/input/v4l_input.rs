// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/v4l_input.rs - V4L 摄像头输入
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

//! V4L2 摄像头输入
//!
//! URL 形式：
//! - `v4l://0` 按编号打开 `/dev/video0`
//! - `v4l:///dev/video2` 按设备路径打开
//! - 可选参数 `?width=640&height=480&fps=30`
//!
//! 优先请求 MJPG，其次接受 RGB3 与 YUYV。

use image::{ImageFormat, RgbImage};
use ouroboros::self_referencing;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;
use v4l::{
  FourCC,
  buffer::Type,
  io::traits::CaptureStream,
  video::{Capture, capture::Parameters},
};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{FrameSource, InputError},
};

const MAX_PROBE_INDEX: usize = 64;
const BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid device: {0}")]
  InvalidDevice(String),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
  #[error("Frame decode error: {0}")]
  DecodeError(#[from] image::ImageError),
  #[error("Captured buffer too small: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

#[self_referencing]
struct V4lStream {
  device: v4l::Device,
  #[borrows(device)]
  #[covariant]
  stream: v4l::io::mmap::Stream<'this>,
}

pub struct V4lInput {
  device_path: String,
  width: u32,
  height: u32,
  fourcc: FourCC,
  state: Option<V4lStream>,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l";
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    let device_path = if !url.path().is_empty() && url.path() != "/" {
      url.path().to_string()
    } else {
      let index = url
        .host_str()
        .unwrap_or("0")
        .parse::<usize>()
        .map_err(|_| V4lInputError::InvalidDevice(url.to_string()))?;
      format!("/dev/video{}", index)
    };

    let query = |key: &str| {
      url
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse::<u32>().ok())
    };

    Self::open(&device_path, query("width"), query("height"), query("fps"))
  }
}

impl V4lInput {
  pub fn open(
    device_path: &str,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
  ) -> Result<Self, V4lInputError> {
    let device = v4l::Device::with_path(device_path)
      .map_err(|e| V4lInputError::InvalidDevice(format!("{}: {}", device_path, e)))?;

    let mut format = device.format()?;
    if let Some(width) = width {
      format.width = width;
    }
    if let Some(height) = height {
      format.height = height;
    }
    format.fourcc = FourCC::new(b"MJPG");
    let format = match device.set_format(&format) {
      Ok(format) => format,
      Err(e) => {
        warn!("设置 {} 格式失败: {}，使用当前格式", device_path, e);
        device.format()?
      }
    };

    if let Some(fps) = fps.filter(|fps| *fps > 0) {
      if let Err(e) = device.set_params(&Parameters::with_fps(fps)) {
        warn!("设置 {} 帧率失败: {}", device_path, e);
      }
    }

    let state = V4lStreamTryBuilder {
      device,
      stream_builder: |device| v4l::io::mmap::Stream::with_buffers(device, Type::VideoCapture, BUFFER_COUNT),
    }
    .try_build()?;

    info!(
      "摄像头已打开: {} {}x{} {}",
      device_path, format.width, format.height, format.fourcc
    );

    Ok(V4lInput {
      device_path: device_path.to_string(),
      width: format.width,
      height: format.height,
      fourcc: format.fourcc,
      state: Some(state),
    })
  }

  fn capture_frame(&mut self) -> Result<Option<RgbImage>, V4lInputError> {
    let Some(state) = self.state.as_mut() else {
      return Ok(None);
    };

    let (width, height, fourcc) = (self.width, self.height, self.fourcc);
    state.with_stream_mut(|stream| {
      let (buf, meta) = stream.next()?;
      let used = (meta.bytesused as usize).min(buf.len());
      let data = if used == 0 { buf } else { &buf[..used] };
      decode_buffer(data, width, height, fourcc).map(Some)
    })
  }
}

impl FrameSource for V4lInput {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
    Ok(self.capture_frame()?)
  }

  fn release(&mut self) {
    if self.state.take().is_some() {
      info!("摄像头已释放: {}", self.device_path);
    }
  }
}

fn decode_buffer(
  data: &[u8],
  width: u32,
  height: u32,
  fourcc: FourCC,
) -> Result<RgbImage, V4lInputError> {
  match &fourcc.repr {
    b"MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.into_rgb8()),
    b"RGB3" => {
      let expected = (width * height * 3) as usize;
      if data.len() < expected {
        return Err(V4lInputError::BufferSizeMismatch {
          expected,
          actual: data.len(),
        });
      }
      RgbImage::from_raw(width, height, data[..expected].to_vec()).ok_or(
        V4lInputError::BufferSizeMismatch {
          expected,
          actual: data.len(),
        },
      )
    }
    b"YUYV" => yuyv_to_rgb(data, width, height),
    _ => Err(V4lInputError::UnsupportedPixelFormat(fourcc.to_string())),
  }
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<RgbImage, V4lInputError> {
  let expected = (width * height * 2) as usize;
  if data.len() < expected {
    return Err(V4lInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut rgb = Vec::with_capacity((width * height * 3) as usize);
  for chunk in data[..expected].chunks_exact(4) {
    let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
    rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
    rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
  }

  RgbImage::from_raw(width, height, rgb).ok_or(V4lInputError::BufferSizeMismatch {
    expected,
    actual: data.len(),
  })
}

// BT.601
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
  let c = y as f32 - 16.0;
  let d = u as f32 - 128.0;
  let e = v as f32 - 128.0;
  let r = 1.164 * c + 1.596 * e;
  let g = 1.164 * c - 0.392 * d - 0.813 * e;
  let b = 1.164 * c + 2.017 * d;
  [
    r.clamp(0.0, 255.0) as u8,
    g.clamp(0.0, 255.0) as u8,
    b.clamp(0.0, 255.0) as u8,
  ]
}

/// 从 0 开始依次尝试打开摄像头，遇到第一个打不开的编号即停止
pub fn probe_cameras() -> Vec<usize> {
  (0..MAX_PROBE_INDEX)
    .map_while(|index| v4l::Device::new(index).ok().map(|_| index))
    .collect()
}
