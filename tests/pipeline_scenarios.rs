// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline_scenarios.rs - 端到端场景
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
use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, TimeDelta, TimeZone};
use image::{Rgb, RgbImage};
use tempfile::tempdir;
use url::Url;

use shanan_sentry::{
  FromUrl,
  clock::SteppingClock,
  config::{ClassConfig, PipelineConfig, SessionContext},
  input::InputWrapper,
  model::DetectorWrapper,
  notify::NotifierWrapper,
  output::OutputWrapper,
  pipeline::Pipeline,
  report::{recent_windows, render_table},
  storage::{AnalyticsStore, AnalyticsStoreWrapper, ImageStoreWrapper},
  task::{ContinuousTask, Task},
};

const CLASSES: &str = r#"{
  "class_names": ["person", "bicycle", "knife", "cup"],
  "threat_objects": ["knife"]
}"#;

fn write_frames(dir: &Path, count: usize) -> Result<()> {
  std::fs::create_dir_all(dir)?;
  for i in 0..count {
    RgbImage::from_pixel(64, 48, Rgb([(i * 10) as u8, 80, 120]))
      .save(dir.join(format!("frame-{:03}.png", i)))?;
  }
  Ok(())
}

fn folder_url(scheme: &str, path: &Path) -> Result<Url> {
  Ok(Url::parse(&format!("{}://{}", scheme, path.display()))?)
}

fn count_files(dir: &Path, extension: &str) -> usize {
  walk(dir)
    .into_iter()
    .filter(|p| p.extension().is_some_and(|e| e == extension))
    .count()
}

fn walk(dir: &Path) -> Vec<std::path::PathBuf> {
  let Ok(entries) = std::fs::read_dir(dir) else {
    return Vec::new();
  };
  entries
    .filter_map(|e| e.ok().map(|e| e.path()))
    .flat_map(|p| if p.is_dir() { walk(&p) } else { vec![p] })
    .collect()
}

#[test]
fn replayed_session_persists_windows_snapshots_and_mail() -> Result<()> {
  let root = tempdir()?;
  let frames_dir = root.path().join("frames");
  let store_dir = root.path().join("store");
  let mail_dir = root.path().join("mail");
  let stream_path = root.path().join("out/stream.mjpeg");
  let replay_path = root.path().join("detections.jsonl");

  write_frames(&frames_dir, 6)?;
  // 帧时间 t0..t50，每 10 秒一帧；窗口 20 秒
  std::fs::write(
    &replay_path,
    [
      r#"[{"class_label": "knife", "confidence": 0.91, "bbox": [4, 4, 30, 30]}]"#,
      r#"[{"class_label": "knife", "confidence": 0.88, "bbox": [4, 4, 30, 30]}, {"class_label": "cup", "confidence": 0.4, "bbox": [1, 1, 5, 5]}]"#,
      r#"[{"class_label": "person", "confidence": 0.7, "bbox": [10, 5, 40, 45]}]"#,
      "",
      r#"[{"class_label": "knife", "confidence": 0.66, "bbox": [4, 4, 30, 30]}]"#,
      "[]",
    ]
    .join("\n"),
  )?;

  let classes = ClassConfig::from_json_str(CLASSES)?;
  let input = InputWrapper::from_url(&folder_url("folder", &frames_dir)?)?;
  let detector = DetectorWrapper::open(&folder_url("replay", &replay_path)?, &classes.catalog())?;
  let output = OutputWrapper::from_url(&folder_url("mjpeg", &stream_path)?)?;
  let images = ImageStoreWrapper::from_url(&folder_url("folder", &store_dir)?)?;
  let analytics = Arc::new(AnalyticsStoreWrapper::from_url(&folder_url("folder", &store_dir)?)?);
  let notifier = NotifierWrapper::from_url(&folder_url("maildrop", &mail_dir)?)?;

  let start = Local.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
  let pipeline = Pipeline::builder(input, detector)
    .with_threats(classes.threat_set())
    .with_session(SessionContext::new(
      Some("u-7".to_string()),
      Some("guard@example.com".to_string()),
    ))
    .with_image_store(Arc::new(images))
    .with_analytics_store(analytics.clone())
    .with_notifier(Arc::new(notifier))
    .with_clock(SteppingClock::new(start, TimeDelta::seconds(10)))
    .with_config(PipelineConfig::default().with_window_secs(20)?)
    .build()?;

  let written = ContinuousTask::default().run_task(pipeline, output)?;
  assert_eq!(written, 6);

  // 窗口边界 t20, t40：t0 告警一次，t40 的刀具属于第三个窗口，再告警一次
  assert_eq!(count_files(&store_dir.join("u-7/records"), "png"), 2);
  assert_eq!(count_files(&mail_dir, "eml"), 2);

  let windows = analytics.get("u-7")?;
  assert_eq!(
    windows.keys().copied().collect::<Vec<_>>(),
    vec![
      (start + TimeDelta::seconds(20)).timestamp_millis(),
      (start + TimeDelta::seconds(40)).timestamp_millis(),
    ]
  );
  let first = &windows[&(start + TimeDelta::seconds(20)).timestamp_millis()];
  assert_eq!(first.len(), 2);
  assert_eq!(first["knife"].frequency, 1);
  assert_eq!(first["knife"].max_confidence, 0.91);
  assert_eq!(first["knife"].min_confidence, 0.88);
  assert!(!first.contains_key("cup"));
  let second = &windows[&(start + TimeDelta::seconds(40)).timestamp_millis()];
  assert_eq!(second.keys().collect::<Vec<_>>(), vec!["knife"]);

  let stream = std::fs::read(&stream_path)?;
  let boundary = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
  let parts = stream
    .windows(boundary.len())
    .filter(|w| *w == boundary)
    .count();
  assert_eq!(parts, 6);

  let table = render_table(&recent_windows(&*analytics, "u-7", 15)?);
  assert!(table.contains("knife"));

  Ok(())
}

#[test]
fn frame_limit_ends_session_and_keeps_anonymous_data_out_of_storage() -> Result<()> {
  let root = tempdir()?;
  let frames_dir = root.path().join("frames");
  let store_dir = root.path().join("store");
  let out_dir = root.path().join("out");
  let replay_path = root.path().join("detections.jsonl");

  write_frames(&frames_dir, 2)?;
  std::fs::write(
    &replay_path,
    r#"[{"class_label": "knife", "confidence": 0.95, "bbox": [4, 4, 30, 30]}]"#,
  )?;

  let classes = ClassConfig::from_json_str(CLASSES)?;
  let input = InputWrapper::from_url(&Url::parse(&format!(
    "folder://{}?loop",
    frames_dir.display()
  ))?)?;
  let detector = DetectorWrapper::open(&folder_url("replay", &replay_path)?, &classes.catalog())?;
  let output = OutputWrapper::from_url(&folder_url("folder", &out_dir)?)?;
  let images = ImageStoreWrapper::from_url(&folder_url("folder", &store_dir)?)?;

  let pipeline = Pipeline::builder(input, detector)
    .with_threats(classes.threat_set())
    .with_image_store(Arc::new(images))
    .build()?;

  let written = ContinuousTask::default()
    .with_frame_number(Some(5))
    .run_task(pipeline, output)?;
  assert_eq!(written, 5);
  assert_eq!(count_files(&out_dir, "jpg"), 5);
  assert_eq!(count_files(&store_dir, "png"), 0);

  Ok(())
}
