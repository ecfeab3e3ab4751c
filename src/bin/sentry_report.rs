// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/sentry_report.rs - 窗口统计报表
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use shanan_sentry::{
  FromUrl,
  report::{DEFAULT_REPORT_LIMIT, clear, recent_windows, render_table},
  storage::AnalyticsStoreWrapper,
};

/// 查看或清除用户的窗口统计记录
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 统计存储，如 folder:///var/lib/sentry
  #[arg(long, value_name = "ANALYTICS")]
  pub analytics: Url,
  #[arg(long, value_name = "USER_ID")]
  pub user: String,
  /// 显示最近的窗口数
  #[arg(long, value_name = "LIMIT", default_value_t = DEFAULT_REPORT_LIMIT)]
  pub limit: usize,
  /// 清除该用户的全部记录
  #[arg(long)]
  pub clear: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let store = AnalyticsStoreWrapper::from_url(&args.analytics)?;

  if args.clear {
    clear(&store, &args.user)?;
    info!("已清除用户 {} 的统计记录", args.user);
    return Ok(());
  }

  let entries = recent_windows(&store, &args.user, args.limit)?;
  if entries.is_empty() {
    info!("用户 {} 暂无统计记录", args.user);
    return Ok(());
  }
  print!("{}", render_table(&entries));

  Ok(())
}
