// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/image_sequence.rs - 图像序列输入
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

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::{FrameSource, InputError},
  url_local_path,
};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum ImageSequenceInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("No image found in {0}")]
  Empty(PathBuf),
}

enum Frames {
  Files { paths: Vec<PathBuf>, cursor: usize },
  Memory(VecDeque<RgbImage>),
}

/// 按文件名顺序逐张读取目录中的图片，或读取单张图片
///
/// `folder:///path/to/frames`，加上 `?loop` 时循环播放。
pub struct ImageSequenceInput {
  frames: Frames,
  repeat: bool,
  released: bool,
}

impl FromUrlWithScheme for ImageSequenceInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageSequenceInput {
  type Error = ImageSequenceInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageSequenceInputError::SchemaMismatch);
    }

    let repeat = url.query_pairs().any(|(k, _)| k == "loop");
    let input = Self::open(url_local_path(url))?;
    Ok(input.with_repeat(repeat))
  }
}

impl ImageSequenceInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageSequenceInputError> {
    let path = path.as_ref();
    let paths = if path.is_dir() {
      let mut paths = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_image_file(p))
        .collect::<Vec<_>>();
      paths.sort();
      paths
    } else {
      vec![path.to_path_buf()]
    };

    if paths.is_empty() {
      return Err(ImageSequenceInputError::Empty(path.to_path_buf()));
    }

    info!("图像序列已打开: {} ({} 张)", path.display(), paths.len());
    Ok(ImageSequenceInput {
      frames: Frames::Files { paths, cursor: 0 },
      repeat: false,
      released: false,
    })
  }

  pub fn from_images(images: impl IntoIterator<Item = RgbImage>) -> Self {
    ImageSequenceInput {
      frames: Frames::Memory(images.into_iter().collect()),
      repeat: false,
      released: false,
    }
  }

  pub fn with_repeat(mut self, repeat: bool) -> Self {
    self.repeat = repeat;
    self
  }

  fn next_image(&mut self) -> Result<Option<RgbImage>, ImageSequenceInputError> {
    match &mut self.frames {
      Frames::Memory(images) => Ok(images.pop_front()),
      Frames::Files { paths, cursor } => {
        if *cursor >= paths.len() {
          if !self.repeat || paths.is_empty() {
            return Ok(None);
          }
          *cursor = 0;
        }
        let path = &paths[*cursor];
        *cursor += 1;
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        Ok(Some(image.into_rgb8()))
      }
    }
  }
}

impl FrameSource for ImageSequenceInput {
  fn read(&mut self) -> Result<Option<RgbImage>, InputError> {
    if self.released {
      return Ok(None);
    }
    Ok(self.next_image()?)
  }

  fn release(&mut self) {
    if self.released {
      return;
    }
    self.released = true;
    self.frames = Frames::Memory(VecDeque::new());
    info!("图像序列已释放");
  }
}

fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}
