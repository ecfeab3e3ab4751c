// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/replay.rs - 检测结果回放
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

//! 预先录制的检测结果回放。
//!
//! 文件为 JSON Lines，每行对应一帧，内容为该帧的检测数组：
//!
//! ```text
//! [{"class_label": "knife", "confidence": 0.91, "bbox": [12, 30, 80, 120]}]
//! []
//! ```
//!
//! 回放结束后每帧返回空结果。

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

use image::RgbImage;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Detection, Detector, DetectorError},
  url_local_path,
};

enum ReplayFrames {
  File(Lines<BufReader<File>>),
  Memory(VecDeque<Vec<Detection>>),
}

pub struct ReplayDetector {
  frames: ReplayFrames,
  line: usize,
}

impl FromUrlWithScheme for ReplayDetector {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayDetector {
  type Error = DetectorError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DetectorError::SchemeMismatch(url.scheme().to_string()));
    }

    let path = url_local_path(url);
    info!("打开检测回放文件: {}", path.display());
    let file = File::open(&path)
      .map_err(|e| DetectorError::Unavailable(format!("{}: {}", path.display(), e)))?;

    Ok(ReplayDetector {
      frames: ReplayFrames::File(BufReader::new(file).lines()),
      line: 0,
    })
  }
}

impl ReplayDetector {
  pub fn from_frames(frames: impl IntoIterator<Item = Vec<Detection>>) -> Self {
    ReplayDetector {
      frames: ReplayFrames::Memory(frames.into_iter().collect()),
      line: 0,
    }
  }

  fn next_frame(&mut self) -> Result<Vec<Detection>, DetectorError> {
    self.line += 1;
    match &mut self.frames {
      ReplayFrames::Memory(frames) => Ok(frames.pop_front().unwrap_or_default()),
      ReplayFrames::File(lines) => match lines.next() {
        None => Ok(Vec::new()),
        Some(line) => {
          let line = line?;
          if line.trim().is_empty() {
            return Ok(Vec::new());
          }
          serde_json::from_str(&line).map_err(|source| DetectorError::Replay {
            line: self.line,
            source,
          })
        }
      },
    }
  }
}

impl Detector for ReplayDetector {
  fn classify(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
    let detections = self.next_frame()?;
    debug!("回放第 {} 帧: {} 个检测结果", self.line, detections.len());
    Ok(detections)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn replays_file_line_by_line_then_goes_quiet() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      r#"[{{"class_label": "knife", "confidence": 0.9, "bbox": [1, 2, 3, 4]}}]"#
    )
    .unwrap();
    writeln!(file).unwrap();
    writeln!(
      file,
      r#"[{{"class_label": "person", "confidence": 0.6, "bbox": [0, 0, 10, 10]}}, {{"class_label": "person", "confidence": 0.7, "bbox": [5, 5, 9, 9]}}]"#
    )
    .unwrap();

    let url = Url::parse(&format!("replay://{}", file.path().display())).unwrap();
    let mut detector = ReplayDetector::from_url(&url).unwrap();
    let frame = RgbImage::new(4, 4);

    let first = detector.classify(&frame).unwrap();
    assert_eq!(first, vec![Detection::new("knife", 0.9, [1.0, 2.0, 3.0, 4.0])]);
    assert!(detector.classify(&frame).unwrap().is_empty());
    assert_eq!(detector.classify(&frame).unwrap().len(), 2);
    assert!(detector.classify(&frame).unwrap().is_empty());
  }

  #[test]
  fn malformed_line_reports_line_number() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[]").unwrap();
    writeln!(file, "{{not json").unwrap();

    let url = Url::parse(&format!("replay://{}", file.path().display())).unwrap();
    let mut detector = ReplayDetector::from_url(&url).unwrap();
    let frame = RgbImage::new(1, 1);

    assert!(detector.classify(&frame).unwrap().is_empty());
    assert!(matches!(
      detector.classify(&frame),
      Err(DetectorError::Replay { line: 2, .. })
    ));
  }

  #[test]
  fn missing_file_is_unavailable() {
    let url = Url::parse("replay:///definitely/not/here.jsonl").unwrap();
    assert!(matches!(
      ReplayDetector::from_url(&url),
      Err(DetectorError::Unavailable(_))
    ));
  }
}
