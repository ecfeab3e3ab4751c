// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 检测结果标注
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, warn};

use crate::{config::ThreatClassSet, model::Detection};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_TEXT_HEIGHT: i32 = 22;
const LABEL_CHAR_WIDTH: f32 = 10.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

pub const NORMAL_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
pub const ALERT_COLOR: [u8; 3] = [255, 0, 0]; // 红色
const TEXT_COLOR: [u8; 3] = [255, 255, 255];

const SYSTEM_FONT_CANDIDATES: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
];

/// 在帧上绘制边框与标签，除帧缓冲外无其他副作用
pub struct Annotator {
  font: Option<FontVec>,
  font_size: f32,
}

impl Default for Annotator {
  fn default() -> Self {
    Self::new()
  }
}

impl Annotator {
  /// 不带字体：只画边框与标签底色
  pub fn new() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
    }
  }

  pub fn with_font_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontVec::try_from_vec(data).map_err(|e| {
      std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("{}: {}", path.as_ref().display(), e),
      )
    })?;
    Ok(Self {
      font: Some(font),
      font_size: LABEL_FONT_SIZE,
    })
  }

  /// 依次尝试常见的系统字体，全部失败时退化为无文字标注
  pub fn with_system_font() -> Self {
    for candidate in SYSTEM_FONT_CANDIDATES {
      if let Ok(annotator) = Self::with_font_file(candidate) {
        debug!("标注字体: {}", candidate);
        return annotator;
      }
    }
    warn!("未找到可用字体，标签将不显示文字");
    Self::new()
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn label_text(detection: &Detection) -> String {
    format!(
      "{} {:.1}%",
      detection.class_label,
      detection.confidence * 100.0
    )
  }

  pub fn color_for(detection: &Detection, threats: &ThreatClassSet) -> [u8; 3] {
    if threats.contains(&detection.class_label) {
      ALERT_COLOR
    } else {
      NORMAL_COLOR
    }
  }

  /// 置信度不足的检测结果不绘制
  pub fn annotate(&self, frame: &mut RgbImage, detection: &Detection, threats: &ThreatClassSet) {
    if !detection.is_qualifying() {
      return;
    }
    let color = Rgb(Self::color_for(detection, threats));
    let (w, h) = (frame.width() as i32, frame.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let [x1, y1, x2, y2] = detection.bbox;
    let x_min = (x1.floor() as i32).clamp(0, w - 1);
    let y_min = (y1.floor() as i32).clamp(0, h - 1);
    let x_max = (x2.ceil() as i32).clamp(0, w - 1);
    let y_max = (y2.ceil() as i32).clamp(0, h - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框加粗，向内收缩
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t + 1;
      let height = y_max - y_min - 2 * t + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(frame, rect, color);
    }

    let label = Self::label_text(detection);
    let text_width = (label.chars().count() as f32 * LABEL_CHAR_WIDTH) as i32;
    let label_x = x_min;
    let label_y = (y_min - LABEL_TEXT_HEIGHT).max(0);
    let label_width = text_width.min(w - label_x);
    if label_width <= 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width as u32, LABEL_TEXT_HEIGHT as u32);
    draw_filled_rect_mut(frame, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        frame,
        Rgb(TEXT_COLOR),
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }

  pub fn annotate_all(&self, frame: &mut RgbImage, detections: &[Detection], threats: &ThreatClassSet) {
    for detection in detections {
      self.annotate(frame, detection, threats);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn threats() -> ThreatClassSet {
    ["knife"].into_iter().collect()
  }

  #[test]
  fn label_uses_one_decimal_percentage() {
    let d = Detection::new("knife", 0.876, [0.0, 0.0, 1.0, 1.0]);
    assert_eq!(Annotator::label_text(&d), "knife 87.6%");
  }

  #[test]
  fn threats_are_drawn_in_alert_color() {
    let annotator = Annotator::new();
    let mut frame = RgbImage::new(100, 100);
    let knife = Detection::new("knife", 0.9, [10.0, 40.0, 50.0, 80.0]);
    annotator.annotate(&mut frame, &knife, &threats());

    // 左边框
    assert_eq!(frame.get_pixel(10, 60), &Rgb(ALERT_COLOR));
    assert_eq!(frame.get_pixel(11, 60), &Rgb(ALERT_COLOR));
    // 框内不受影响
    assert_eq!(frame.get_pixel(30, 60), &Rgb([0, 0, 0]));
    // 标签底色位于边框上方
    assert_eq!(frame.get_pixel(12, 20), &Rgb(ALERT_COLOR));
  }

  #[test]
  fn other_classes_are_drawn_in_normal_color() {
    let annotator = Annotator::new();
    let mut frame = RgbImage::new(100, 100);
    let cup = Detection::new("cup", 0.7, [10.0, 40.0, 50.0, 80.0]);
    annotator.annotate(&mut frame, &cup, &threats());
    assert_eq!(frame.get_pixel(50, 60), &Rgb(NORMAL_COLOR));
  }

  #[test]
  fn low_confidence_detection_leaves_frame_untouched() {
    let annotator = Annotator::new();
    let mut frame = RgbImage::new(100, 100);
    let before = frame.clone();
    let weak = Detection::new("knife", 0.3, [10.0, 40.0, 50.0, 80.0]);
    annotator.annotate(&mut frame, &weak, &threats());
    assert_eq!(frame, before);
  }

  #[test]
  fn boxes_outside_the_frame_are_clamped() {
    let annotator = Annotator::new();
    let mut frame = RgbImage::new(20, 20);
    let wide = Detection::new("cup", 0.7, [-10.0, -10.0, 500.0, 500.0]);
    annotator.annotate(&mut frame, &wide, &threats());
    assert_eq!(frame.get_pixel(0, 10), &Rgb(NORMAL_COLOR));
    assert_eq!(frame.get_pixel(19, 10), &Rgb(NORMAL_COLOR));
  }
}
