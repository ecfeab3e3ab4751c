// 该文件是 Shanan （山南西风） 项目的一部分。
// src/alert.rs - 威胁告警分发
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

use std::sync::Arc;

use chrono::{DateTime, Local};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  clock::format_timestamp,
  config::{SessionContext, ThreatClassSet},
  frame::encode_png,
  model::Detection,
  notify::{Notification, Notifier},
  storage::{ImageCategory, ImageStore, image_path},
  worker::SideEffectQueue,
};

pub const ALERT_SUBJECT: &str = "Security Alert: Unauthorized Object Detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
  Dispatched,
  Skipped,
}

/// 每个窗口最多发出一次告警
pub struct AlertDispatcher {
  threats: Arc<ThreatClassSet>,
  session: SessionContext,
  // 未配置时不保存快照
  images: Option<Arc<dyn ImageStore>>,
  notifier: Arc<dyn Notifier>,
  queue: SideEffectQueue,
  alert_sent: bool,
}

impl AlertDispatcher {
  pub fn new(
    threats: Arc<ThreatClassSet>,
    session: SessionContext,
    images: Option<Arc<dyn ImageStore>>,
    notifier: Arc<dyn Notifier>,
    queue: SideEffectQueue,
  ) -> Self {
    Self {
      threats,
      session,
      images,
      notifier,
      queue,
      alert_sent: false,
    }
  }

  pub fn alert_sent(&self) -> bool {
    self.alert_sent
  }

  /// 窗口结束时调用
  pub fn reset(&mut self) {
    self.alert_sent = false;
  }

  /// 快照与通知交给后台线程，本函数不等待其完成
  pub fn consider(
    &mut self,
    detection: &Detection,
    frame: &RgbImage,
    at: DateTime<Local>,
  ) -> AlertOutcome {
    if !detection.is_qualifying()
      || !self.threats.contains(&detection.class_label)
      || self.alert_sent
    {
      return AlertOutcome::Skipped;
    }

    // 提交失败也视为已告警，保证至多一次
    self.alert_sent = true;
    info!(
      "检测到威胁目标 {} ({:.1}%)，发出告警",
      detection.class_label,
      detection.confidence * 100.0
    );

    self.submit_snapshot(frame, at);
    self.submit_notification(detection, at);
    AlertOutcome::Dispatched
  }

  fn submit_snapshot(&self, frame: &RgbImage, at: DateTime<Local>) {
    let Some(user_id) = self.session.user_id() else {
      debug!("未指定用户，跳过告警快照");
      return;
    };
    let Some(images) = &self.images else {
      debug!("未配置图片存储，跳过告警快照");
      return;
    };

    let path = image_path(user_id, ImageCategory::Records, &at);
    let images = Arc::clone(images);
    let frame = frame.clone();
    let result = self.queue.submit("snapshot", move || {
      let bytes = encode_png(&frame)?;
      images.put(&path, &bytes)?;
      Ok(())
    });
    if let Err(e) = result {
      warn!("告警快照未提交: {}", e);
    }
  }

  fn submit_notification(&self, detection: &Detection, at: DateTime<Local>) {
    let Some(contact) = self.session.contact() else {
      debug!("未指定联系地址，跳过告警通知");
      return;
    };

    let notification = compose_alert(detection, &at, contact);
    let notifier = Arc::clone(&self.notifier);
    let result = self.queue.submit("notification", move || {
      notifier.send(&notification)?;
      Ok(())
    });
    if let Err(e) = result {
      warn!("告警通知未提交: {}", e);
    }
  }
}

/// 发件人与收件人均为会话的联系地址
pub fn compose_alert(detection: &Detection, at: &DateTime<Local>, contact: &str) -> Notification {
  let percent = detection.confidence * 100.0;
  let body = format!(
    "{subject}\n\n\
     Object: {object}\n\
     Detection Time: {time}\n\
     Confidence Level: {percent:.1}%\n\n\
     Description:\n\
     The object '{label}' was detected by the security system at the specified time and location. \
     The detection was made with a confidence level of {percent:.1}%. \
     Please review the recorded snapshot for visual confirmation and take necessary action.\n\n\
     This is an automated alert generated by the security monitoring system.\n",
    subject = ALERT_SUBJECT,
    object = capitalize(&detection.class_label),
    time = format_timestamp(at),
    label = detection.class_label,
  );

  Notification {
    subject: ALERT_SUBJECT.to_string(),
    body,
    sender: contact.to_string(),
    recipients: vec![contact.to_string()],
  }
}

fn capitalize(label: &str) -> String {
  let mut chars = label.chars();
  match chars.next() {
    Some(first) => first
      .to_uppercase()
      .chain(chars.flat_map(char::to_lowercase))
      .collect(),
    None => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    notify::{MemoryNotifier, NotifyError},
    storage::{MemoryImageStore, StorageError},
    worker::WorkerPool,
  };
  use chrono::TimeZone;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::mpsc;
  use std::time::Duration;

  #[derive(Default)]
  struct BrokenDisk {
    attempts: AtomicUsize,
  }

  impl ImageStore for BrokenDisk {
    fn put(&self, _path: &str, _image_bytes: &[u8]) -> Result<(), StorageError> {
      self.attempts.fetch_add(1, Ordering::SeqCst);
      Err(StorageError::Io(std::io::Error::other("disk full")))
    }
  }

  #[derive(Default)]
  struct BrokenMailer {
    attempts: AtomicUsize,
  }

  impl Notifier for BrokenMailer {
    fn send(&self, _notification: &Notification) -> Result<(), NotifyError> {
      self.attempts.fetch_add(1, Ordering::SeqCst);
      Err(NotifyError::Io(std::io::Error::other("relay refused")))
    }
  }

  struct Harness {
    images: Arc<MemoryImageStore>,
    notifier: Arc<MemoryNotifier>,
    dispatcher: AlertDispatcher,
    pool: WorkerPool,
  }

  fn harness(session: SessionContext) -> Harness {
    let pool = WorkerPool::new(1, 8).unwrap();
    let images = Arc::new(MemoryImageStore::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let threats = Arc::new(["knife", "scissors"].into_iter().collect::<ThreatClassSet>());
    let dispatcher = AlertDispatcher::new(
      threats,
      session,
      Some(images.clone()),
      notifier.clone(),
      pool.queue(),
    );
    Harness {
      images,
      notifier,
      dispatcher,
      pool,
    }
  }

  fn at() -> DateTime<Local> {
    Local.with_ymd_and_hms(2026, 5, 6, 7, 8, 9).unwrap()
  }

  fn knife(confidence: f32) -> Detection {
    Detection::new("knife", confidence, [1.0, 1.0, 3.0, 3.0])
  }

  fn signed_in() -> SessionContext {
    SessionContext::new(Some("u1".into()), Some("guard@example.com".into()))
  }

  #[test]
  fn only_first_threat_in_window_dispatches() {
    let Harness {
      images,
      notifier,
      mut dispatcher,
      pool,
    } = harness(signed_in());
    let frame = RgbImage::new(4, 4);

    assert_eq!(dispatcher.consider(&knife(0.9), &frame, at()), AlertOutcome::Dispatched);
    assert_eq!(dispatcher.consider(&knife(0.95), &frame, at()), AlertOutcome::Skipped);
    assert!(dispatcher.alert_sent());

    dispatcher.reset();
    assert_eq!(dispatcher.consider(&knife(0.8), &frame, at()), AlertOutcome::Dispatched);

    drop(dispatcher);
    drop(pool);
    assert_eq!(images.paths(), vec!["u1/records/2026-05-06 07:08:09.png".to_string()]);
    assert_eq!(notifier.sent().len(), 2);
  }

  #[test]
  fn low_confidence_and_non_threats_are_inert() {
    let Harness { mut dispatcher, .. } = harness(signed_in());
    let frame = RgbImage::new(4, 4);

    assert_eq!(dispatcher.consider(&knife(0.3), &frame, at()), AlertOutcome::Skipped);
    let person = Detection::new("person", 0.99, [0.0, 0.0, 2.0, 2.0]);
    assert_eq!(dispatcher.consider(&person, &frame, at()), AlertOutcome::Skipped);
    assert!(!dispatcher.alert_sent());
  }

  #[test]
  fn anonymous_session_still_dispatches_without_side_effects() {
    let Harness {
      images,
      notifier,
      mut dispatcher,
      pool,
    } = harness(SessionContext::anonymous());
    let frame = RgbImage::new(4, 4);

    assert_eq!(dispatcher.consider(&knife(0.9), &frame, at()), AlertOutcome::Dispatched);
    drop(pool);
    assert!(images.paths().is_empty());
    assert!(notifier.sent().is_empty());
  }

  #[test]
  fn failed_side_effects_keep_the_window_alerted() {
    let pool = WorkerPool::new(1, 8).unwrap();
    let images = Arc::new(BrokenDisk::default());
    let notifier = Arc::new(BrokenMailer::default());
    let mut dispatcher = AlertDispatcher::new(
      Arc::new(["knife"].into_iter().collect::<ThreatClassSet>()),
      signed_in(),
      Some(images.clone()),
      notifier.clone(),
      pool.queue(),
    );
    let frame = RgbImage::new(4, 4);

    assert_eq!(dispatcher.consider(&knife(0.9), &frame, at()), AlertOutcome::Dispatched);
    assert_eq!(dispatcher.consider(&knife(0.9), &frame, at()), AlertOutcome::Skipped);
    assert!(dispatcher.alert_sent());

    drop(dispatcher);
    drop(pool);
    assert_eq!(images.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.attempts.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn full_queue_drops_side_effects_but_still_marks_the_window() {
    let pool = WorkerPool::new(1, 1).unwrap();
    let queue = pool.queue();
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    queue
      .submit("blocker", move || {
        let _ = started_tx.send(());
        let _ = release_rx.recv();
        Ok(())
      })
      .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    queue.submit("filler", || Ok(())).unwrap();

    let images = Arc::new(MemoryImageStore::default());
    let notifier = Arc::new(MemoryNotifier::default());
    let mut dispatcher = AlertDispatcher::new(
      Arc::new(["knife"].into_iter().collect::<ThreatClassSet>()),
      signed_in(),
      Some(images.clone()),
      notifier.clone(),
      queue,
    );
    let frame = RgbImage::new(4, 4);

    assert_eq!(dispatcher.consider(&knife(0.9), &frame, at()), AlertOutcome::Dispatched);
    assert!(dispatcher.alert_sent());
    assert_eq!(dispatcher.consider(&knife(0.9), &frame, at()), AlertOutcome::Skipped);

    release_tx.send(()).unwrap();
    drop(dispatcher);
    drop(pool);
    assert!(images.paths().is_empty());
    assert!(notifier.sent().is_empty());
  }

  #[test]
  fn missing_image_store_only_skips_the_snapshot() {
    let pool = WorkerPool::new(1, 8).unwrap();
    let notifier = Arc::new(MemoryNotifier::default());
    let mut dispatcher = AlertDispatcher::new(
      Arc::new(["knife"].into_iter().collect::<ThreatClassSet>()),
      signed_in(),
      None,
      notifier.clone(),
      pool.queue(),
    );

    let frame = RgbImage::new(4, 4);
    assert_eq!(dispatcher.consider(&knife(0.9), &frame, at()), AlertOutcome::Dispatched);
    drop(dispatcher);
    drop(pool);
    assert_eq!(notifier.sent().len(), 1);
  }

  #[test]
  fn alert_message_follows_template() {
    let message = compose_alert(&knife(0.876), &at(), "guard@example.com");
    assert_eq!(message.subject, ALERT_SUBJECT);
    assert_eq!(message.sender, "guard@example.com");
    assert_eq!(message.recipients, vec!["guard@example.com".to_string()]);
    assert!(message.body.contains("Object: Knife\n"));
    assert!(message.body.contains("Detection Time: 2026-05-06 07:08:09\n"));
    assert!(message.body.contains("Confidence Level: 87.6%\n"));
  }

  #[test]
  fn capitalize_matches_sentence_case() {
    assert_eq!(capitalize("baseball bat"), "Baseball bat");
    assert_eq!(capitalize("KNIFE"), "Knife");
    assert_eq!(capitalize(""), "");
  }
}
