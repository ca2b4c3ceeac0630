// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/decode_oneshot.rs - 单次后处理
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
use url::Url;

use shanan_decode::{
  FromUrl,
  input::{TensorDumpFrame, TensorDumpInput},
  letterbox::Letterbox,
  model::Yolov8Builder,
  output::{OutputWrapper, Unletterbox},
  task::{OneShotTask, Task},
};
use tracing::info;

/// Shanan 量化输出解码参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 后处理配置
  #[arg(long, value_name = "MODEL", default_value = "yolov8://")]
  pub model: Url,
  /// 张量转储清单
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 原图尺寸，给出时检测框映射回原图坐标
  #[arg(long, value_name = "WxH", value_parser = parse_size)]
  pub source_size: Option<(u32, u32)>,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
  let (w, h) = s
    .split_once(['x', 'X'])
    .ok_or_else(|| format!("尺寸格式应为 WxH: {}", s))?;
  let w = w.parse().map_err(|_| format!("宽度无效: {}", w))?;
  let h = h.parse().map_err(|_| format!("高度无效: {}", h))?;
  Ok((w, h))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("后处理配置: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = TensorDumpInput::from_url(&args.input)?;
  let model = Yolov8Builder::from_url(&args.model)?.build::<TensorDumpFrame>()?;
  let output = OutputWrapper::from_url(&args.output)?;

  match args.source_size {
    Some((w, h)) => {
      let letterbox = Letterbox::new(w, h, model.input_size() as u32);
      OneShotTask.run_task(input.into_frames(), model, Unletterbox::new(output, letterbox))?;
    }
    None => OneShotTask.run_task(input.into_frames(), model, output)?,
  }

  Ok(())
}
