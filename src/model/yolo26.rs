// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolo26.rs - YOLO26 RKNN 检测器
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

use std::path::PathBuf;

use image::{
  RgbImage,
  imageops::{self, FilterType},
};
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  config::ClassCatalog,
  model::{Detection, Detector, DetectorError, QUALIFYING_CONFIDENCE},
  url_local_path,
};

const YOLO26_NUM_INPUTS: u32 = 1;
const YOLO26_NUM_OUTPUTS: u32 = 6;
const YOLO26_CLASS_NUM: usize = 80;
const YOLO26_INPUT_W: u32 = 640;
const YOLO26_INPUT_H: u32 = 640;
const YOLO26_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO26_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];
// 与 QUALIFYING_CONFIDENCE 一致，更低的结果下游一律丢弃
const YOLO26_OBJECT_THRESH: f32 = QUALIFYING_CONFIDENCE;

#[derive(Error, Debug)]
pub enum Yolo26Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl Yolo26Error {
  fn invalid(msg: &str, e: rknpu::Error) -> Self {
    Yolo26Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolo26Builder {
  model_path: PathBuf,
  flags: InitFlags,
}

impl FromUrlWithScheme for Yolo26Builder {
  const SCHEME: &'static str = "yolo26";
}

impl FromUrl for Yolo26Builder {
  type Error = Yolo26Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolo26Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(Yolo26Builder {
      model_path: url_local_path(url),
      flags: InitFlags::default(),
    })
  }
}

impl Yolo26Builder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self, catalog: ClassCatalog) -> Result<Yolo26, Yolo26Error> {
    info!("加载模型文件: {}", self.model_path.display());
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let context = Context::new(&model_data, self.flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| Yolo26Error::invalid("无法获取输出数量", e))?;

    if num_inputs != YOLO26_NUM_INPUTS || num_outputs != YOLO26_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        YOLO26_NUM_INPUTS, YOLO26_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(Yolo26Error::invalid(&msg, rknpu::Error::InvalidModel));
    }

    if catalog.len() != YOLO26_CLASS_NUM {
      debug!(
        "类别表长度 {} 与模型类别数 {} 不一致，超出部分的检测结果将被忽略",
        catalog.len(),
        YOLO26_CLASS_NUM
      );
    }

    info!("模型加载完成");
    Ok(Yolo26 { context, catalog })
  }
}

pub struct Yolo26 {
  context: Context,
  catalog: ClassCatalog,
}

/// 模型坐标系中的一个候选框，坐标已归一化到 [0, 1]
struct RawBox {
  class_id: u32,
  score: f32,
  bbox: [f32; 4],
}

impl Yolo26 {
  fn infer(&self, frame: &RgbImage) -> Result<rknpu::Output, rknpu::Error> {
    let input = imageops::resize(frame, YOLO26_INPUT_W, YOLO26_INPUT_H, FilterType::Triangle);
    self
      .context
      .set_input(0, input.as_raw(), TensorFormat::NHWC, TensorType::UInt8)?;
    self.context.run()?;
    self.context.get_outputs()
  }
}

impl Detector for Yolo26 {
  fn classify(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
    let output = self
      .infer(frame)
      .map_err(|e| DetectorError::Unavailable(format!("RKNN 推理失败: {}", e)))?;

    let (w, h) = (frame.width() as f32, frame.height() as f32);
    let detections = decode_heads(&output)
      .into_iter()
      .filter_map(|raw| {
        let label = self.catalog.label(raw.class_id)?;
        Some(Detection::new(
          label,
          raw.score,
          [
            raw.bbox[0] * w,
            raw.bbox[1] * h,
            raw.bbox[2] * w,
            raw.bbox[3] * h,
          ],
        ))
      })
      .collect::<Vec<_>>();

    debug!("检测到 {} 个物体", detections.len());
    Ok(detections)
  }
}

/// 三个检测头各输出一对 (回归, 分类) 张量，顺序可能互换，按大小区分
fn decode_heads(output: &rknpu::Output) -> Vec<RawBox> {
  let mut items = Vec::new();

  for (head_idx, (&(map_h, map_w), stride)) in
    YOLO26_HEAD_SIZES.iter().zip(YOLO26_STRIDES).enumerate()
  {
    let spatial = map_h * map_w;
    let reg_expected = 4 * spatial;
    let cls_expected = YOLO26_CLASS_NUM * spatial;

    let (Ok(first), Ok(second)) = (output.get_f32(head_idx * 2), output.get_f32(head_idx * 2 + 1))
    else {
      error!("检测头 {}: 获取输出失败", head_idx);
      continue;
    };

    let (reg, cls) = if first.len() == reg_expected && second.len() == cls_expected {
      (first, second)
    } else if first.len() == cls_expected && second.len() == reg_expected {
      (second, first)
    } else {
      error!(
        "检测头 {}: 输出大小不匹配 ({}, {}), 期望回归 {} / 分类 {}",
        head_idx,
        first.len(),
        second.len(),
        reg_expected,
        cls_expected
      );
      continue;
    };

    items.extend(decode_head(&reg[..], &cls[..], (map_h, map_w), stride));
  }

  items
}

/// 单个检测头：回归张量为 4 个平面 (左, 上, 右, 下)，分类张量为每类一个平面
fn decode_head(
  reg: &[f32],
  cls: &[f32],
  (map_h, map_w): (usize, usize),
  stride: f32,
) -> Vec<RawBox> {
  let spatial = map_h * map_w;
  let in_w = YOLO26_INPUT_W as f32;
  let in_h = YOLO26_INPUT_H as f32;
  let mut items = Vec::new();

  for y in 0..map_h {
    for x in 0..map_w {
      let idx = y * map_w + x;

      let (class_id, max_logit) = (0..YOLO26_CLASS_NUM)
        .map(|c| (c, cls[c * spatial + idx]))
        .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
      let score = sigmoid(max_logit);
      if score < YOLO26_OBJECT_THRESH {
        continue;
      }

      let grid_x = x as f32 + 0.5;
      let grid_y = y as f32 + 0.5;
      let x_min = ((grid_x - reg[idx]) * stride).clamp(0.0, in_w);
      let y_min = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, in_h);
      let x_max = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, in_w);
      let y_max = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, in_h);

      items.push(RawBox {
        class_id: class_id as u32,
        score,
        bbox: [x_min / in_w, y_min / in_h, x_max / in_w, y_max / in_h],
      });
    }
  }

  items
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
