// 该文件是 Shanan （山南西风） 项目的一部分。
// src/worker.rs - 后台副作用工作线程池
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

//! 固定线程数、有界队列的工作线程池。
//!
//! 提交从不阻塞：队列满时直接返回 [`WorkerError::QueueFull`]。
//! 任务失败或 panic 只记录日志，结果不会回流到主循环，线程数保持不变。
//! 析构时等待队列中已有的任务执行完，最长约为队列容量乘以单个任务耗时。

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{notify::NotifyError, storage::StorageError};

/// 后台任务的失败原因
#[derive(Error, Debug)]
pub enum SideEffectError {
  #[error("存储失败: {0}")]
  Storage(#[from] StorageError),
  #[error("通知失败: {0}")]
  Notify(#[from] NotifyError),
  #[error("图片编码失败: {0}")]
  Encode(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("任务队列已满，丢弃任务: {0}")]
  QueueFull(&'static str),
  #[error("工作线程池已关闭")]
  Closed,
  #[error("无法创建工作线程: {0}")]
  Spawn(#[from] std::io::Error),
}

type Job = Box<dyn FnOnce() -> Result<(), SideEffectError> + Send + 'static>;

enum Message {
  Run { label: &'static str, job: Job },
  Shutdown,
}

/// 提交端，可复制给多个使用者
#[derive(Clone)]
pub struct SideEffectQueue {
  sender: SyncSender<Message>,
}

impl SideEffectQueue {
  pub fn submit<F>(&self, label: &'static str, job: F) -> Result<(), WorkerError>
  where
    F: FnOnce() -> Result<(), SideEffectError> + Send + 'static,
  {
    let message = Message::Run {
      label,
      job: Box::new(job),
    };
    match self.sender.try_send(message) {
      Ok(()) => Ok(()),
      Err(TrySendError::Full(_)) => Err(WorkerError::QueueFull(label)),
      Err(TrySendError::Disconnected(_)) => Err(WorkerError::Closed),
    }
  }
}

pub struct WorkerPool {
  queue: SideEffectQueue,
  workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
  pub fn new(workers: usize, capacity: usize) -> Result<Self, WorkerError> {
    let workers = workers.max(1);
    let (sender, receiver) = mpsc::sync_channel::<Message>(capacity.max(1));
    let receiver = Arc::new(Mutex::new(receiver));

    let handles = (0..workers)
      .map(|id| {
        let receiver = Arc::clone(&receiver);
        std::thread::Builder::new()
          .name(format!("side-effect-{}", id))
          .spawn(move || worker_loop(id, receiver))
      })
      .collect::<Result<Vec<_>, _>>()?;

    debug!("工作线程池已启动: {} 线程, 队列容量 {}", workers, capacity);
    Ok(Self {
      queue: SideEffectQueue { sender },
      workers: handles,
    })
  }

  pub fn queue(&self) -> SideEffectQueue {
    self.queue.clone()
  }
}

fn worker_loop(id: usize, receiver: Arc<Mutex<Receiver<Message>>>) {
  loop {
    let message = {
      let guard = receiver.lock().unwrap_or_else(|p| p.into_inner());
      guard.recv()
    };
    match message {
      Ok(Message::Run { label, job }) => match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(())) => debug!("后台任务 {} 完成 (线程 {})", label, id),
        Ok(Err(e)) => warn!("后台任务 {} 失败: {}", label, e),
        Err(_) => error!("后台任务 {} 异常终止 (线程 {})", label, id),
      },
      Ok(Message::Shutdown) | Err(_) => break,
    }
  }
}

impl Drop for WorkerPool {
  /// 队列中已有的任务先执行完，再结束线程
  fn drop(&mut self) {
    for _ in 0..self.workers.len() {
      if self.queue.sender.send(Message::Shutdown).is_err() {
        break;
      }
    }
    for handle in self.workers.drain(..) {
      if handle.join().is_err() {
        warn!("工作线程异常退出");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  #[test]
  fn queued_jobs_finish_before_drop_returns() {
    let done = Arc::new(AtomicUsize::new(0));
    {
      let pool = WorkerPool::new(2, 8).unwrap();
      let queue = pool.queue();
      for _ in 0..5 {
        let done = Arc::clone(&done);
        queue
          .submit("count", move || {
            done.fetch_add(1, Ordering::SeqCst);
            Ok(())
          })
          .unwrap();
      }
    }
    assert_eq!(done.load(Ordering::SeqCst), 5);
  }

  #[test]
  fn full_queue_rejects_without_blocking() {
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

    queue.submit("queued", || Ok(())).unwrap();
    assert!(matches!(
      queue.submit("dropped", || Ok(())),
      Err(WorkerError::QueueFull("dropped"))
    ));

    release_tx.send(()).unwrap();
  }

  #[test]
  fn failing_job_does_not_stop_worker() {
    let done = Arc::new(AtomicUsize::new(0));
    {
      let pool = WorkerPool::new(1, 4).unwrap();
      let queue = pool.queue();
      queue
        .submit("fail", || Err(NotifyError::NoRecipient.into()))
        .unwrap();
      let counter = Arc::clone(&done);
      queue
        .submit("after", move || {
          counter.fetch_add(1, Ordering::SeqCst);
          Ok(())
        })
        .unwrap();
    }
    assert_eq!(done.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn panicking_job_keeps_the_worker_alive() {
    let done = Arc::new(AtomicUsize::new(0));
    {
      let pool = WorkerPool::new(1, 4).unwrap();
      let queue = pool.queue();
      queue.submit("panic", || panic!("encoder exploded")).unwrap();
      for _ in 0..2 {
        let counter = Arc::clone(&done);
        queue
          .submit("after", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
          })
          .unwrap();
      }
    }
    assert_eq!(done.load(Ordering::SeqCst), 2);
  }
}
