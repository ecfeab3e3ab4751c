// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/sentry_capture.rs - 手动抓拍上传
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

use anyhow::{Result, bail};
use chrono::Local;
use clap::Parser;
use tracing::info;
use url::Url;

use shanan_sentry::{
  FromUrl,
  capture::{decode_data_url, decode_image, store_capture},
  storage::ImageStoreWrapper,
};

/// 保存一张手动抓拍的图片
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图片存储，如 folder:///var/lib/sentry
  #[arg(long, value_name = "IMAGES")]
  pub images: Url,
  #[arg(long, value_name = "USER_ID")]
  pub user: String,
  /// 图片文件
  #[arg(long, value_name = "FILE", conflicts_with = "data_url")]
  pub file: Option<PathBuf>,
  /// base64 data URL，如 data:image/png;base64,...
  #[arg(long, value_name = "DATA_URL")]
  pub data_url: Option<String>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let bytes = match (&args.file, &args.data_url) {
    (Some(path), _) => std::fs::read(path)?,
    (None, Some(data_url)) => decode_data_url(data_url)?,
    (None, None) => bail!("需要提供 --file 或 --data-url"),
  };
  let image = decode_image(&bytes)?;

  let store = ImageStoreWrapper::from_url(&args.images)?;
  let path = store_capture(&store, &args.user, &image, &Local::now())?;
  info!("抓拍已保存: {}", path);

  Ok(())
}
