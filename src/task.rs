// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 推流任务
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

use std::sync::mpsc::{self, Receiver};
use std::{thread, time::Duration};

use tracing::{info, warn};

use crate::{frame::EncodedFrame, output::FrameSink};

pub trait Task<I, O>: Sized {
  type Error;
  fn run_task(self, input: I, output: O) -> Result<usize, Self::Error>;
}

/// 持续消费管线产出的帧，直到帧源结束、达到帧数上限或收到中断信号
///
/// 返回时管线随之析构，帧源被释放。
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  interrupt_handler: bool,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 注册 Ctrl-C 处理，进程内只能注册一次
  pub fn with_interrupt_handler(mut self, enabled: bool) -> Self {
    self.interrupt_handler = enabled;
    self
  }

  fn install_interrupt(&self) -> anyhow::Result<Option<Receiver<()>>> {
    if !self.interrupt_handler {
      return Ok(None);
    }
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;
    Ok(Some(rx))
  }
}

impl<I, O, E> Task<I, O> for ContinuousTask
where
  I: Iterator<Item = EncodedFrame>,
  O: FrameSink<Error = E>,
  E: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut output: O) -> Result<usize, Self::Error> {
    info!("开始任务...");
    let interrupt = self.install_interrupt()?;

    let mut written = 0usize;
    let mut now = std::time::Instant::now();
    for frame in input {
      output.write_frame(&frame)?;
      written += 1;
      info!(
        "第 {} 帧已输出 ({} 字节)，耗时: {:.2?}",
        frame.index,
        frame.bytes.len(),
        now.elapsed()
      );
      now = std::time::Instant::now();

      if self.frame_number.map(|n| written >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", written);
        break;
      }
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!("任务完成，共输出 {} 帧", written);
    Ok(written)
  }
}
