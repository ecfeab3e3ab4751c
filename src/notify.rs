// 该文件是 Shanan （山南西风） 项目的一部分。
// src/notify.rs - 告警通知
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
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, url_local_path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub subject: String,
  pub body: String,
  pub sender: String,
  pub recipients: Vec<String>,
}

#[derive(Error, Debug)]
pub enum NotifyError {
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("通知缺少收件人")]
  NoRecipient,
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub trait Notifier: Send + Sync {
  fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// 只写日志：`log://`
#[derive(Debug, Default)]
pub struct LogNotifier;

impl FromUrlWithScheme for LogNotifier {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogNotifier {
  type Error = NotifyError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(NotifyError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(LogNotifier)
  }
}

impl Notifier for LogNotifier {
  fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
    if notification.recipients.is_empty() {
      return Err(NotifyError::NoRecipient);
    }
    warn!(
      "[通知] {} -> {}: {}\n{}",
      notification.sender,
      notification.recipients.join(", "),
      notification.subject,
      notification.body
    );
    Ok(())
  }
}

/// 每封通知写成一个 `.eml` 文件：`maildrop:///var/spool/sentry`
///
/// 交由外部 MTA 或人工投递。
#[derive(Debug)]
pub struct MailDropNotifier {
  dir: PathBuf,
  sequence: AtomicU64,
}

impl FromUrlWithScheme for MailDropNotifier {
  const SCHEME: &'static str = "maildrop";
}

impl FromUrl for MailDropNotifier {
  type Error = NotifyError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(NotifyError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(Self::new(url_local_path(url)))
  }
}

impl MailDropNotifier {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self {
      dir: dir.into(),
      sequence: AtomicU64::new(0),
    }
  }

  fn render(notification: &Notification) -> String {
    format!(
      "From: {}\r\nTo: {}\r\nSubject: {}\r\nDate: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{}\r\n",
      notification.sender,
      notification.recipients.join(", "),
      notification.subject,
      Local::now().to_rfc2822(),
      notification.body.replace('\n', "\r\n"),
    )
  }
}

impl Notifier for MailDropNotifier {
  fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
    if notification.recipients.is_empty() {
      return Err(NotifyError::NoRecipient);
    }
    std::fs::create_dir_all(&self.dir)?;
    let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
    let path = self.dir.join(format!(
      "{}-{:04}.eml",
      Local::now().format("%Y%m%d%H%M%S"),
      seq
    ));
    std::fs::write(&path, Self::render(notification))?;
    info!("通知已写入: {}", path.display());
    Ok(())
  }
}

/// 记录已发送的通知，仅供测试使用
#[derive(Debug, Default)]
pub struct MemoryNotifier {
  sent: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
  pub fn sent(&self) -> Vec<Notification> {
    self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
  }
}

impl Notifier for MemoryNotifier {
  fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
    if notification.recipients.is_empty() {
      return Err(NotifyError::NoRecipient);
    }
    self
      .sent
      .lock()
      .unwrap_or_else(|p| p.into_inner())
      .push(notification.clone());
    Ok(())
  }
}

pub enum NotifierWrapper {
  Log(LogNotifier),
  MailDrop(MailDropNotifier),
}

impl FromUrl for NotifierWrapper {
  type Error = NotifyError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      LogNotifier::SCHEME => Ok(NotifierWrapper::Log(LogNotifier::from_url(url)?)),
      MailDropNotifier::SCHEME => Ok(NotifierWrapper::MailDrop(MailDropNotifier::from_url(url)?)),
      other => Err(NotifyError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Notifier for NotifierWrapper {
  fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
    match self {
      NotifierWrapper::Log(n) => n.send(notification),
      NotifierWrapper::MailDrop(n) => n.send(notification),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn notification() -> Notification {
    Notification {
      subject: "Security Alert".to_string(),
      body: "line one\nline two".to_string(),
      sender: "guard@example.com".to_string(),
      recipients: vec!["guard@example.com".to_string()],
    }
  }

  #[test]
  fn maildrop_writes_one_file_per_message() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("maildrop://{}", dir.path().display())).unwrap();
    let notifier = NotifierWrapper::from_url(&url).unwrap();

    notifier.send(&notification()).unwrap();
    notifier.send(&notification()).unwrap();

    let files = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(files, 2);

    let entry = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap();
    let content = std::fs::read_to_string(entry.path()).unwrap();
    assert!(content.contains("Subject: Security Alert\r\n"));
    assert!(content.contains("To: guard@example.com\r\n"));
    assert!(content.contains("line one\r\nline two"));
  }

  #[test]
  fn message_without_recipient_is_rejected() {
    let notifier = MemoryNotifier::default();
    let mut message = notification();
    message.recipients.clear();
    assert!(matches!(
      notifier.send(&message),
      Err(NotifyError::NoRecipient)
    ));
    assert!(notifier.sent().is_empty());
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    for url in ["smtp://mail.example.com", "memory://"] {
      let url = Url::parse(url).unwrap();
      assert!(matches!(
        NotifierWrapper::from_url(&url),
        Err(NotifyError::SchemeMismatch(_))
      ));
    }
  }
}
