// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理基准测试
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_yolov5::{
  FromUrl,
  args::DetectArgs,
  input::InputWrapper,
  model::{NetworkWrapper, Yolov5},
  output::OutputWrapper,
  task::{RepeatShotTask, Task},
};
use tracing::info;

/// 对同一帧重复推理并统计平均耗时
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型文件，例如 rknn:///models/yolov5s.rknn
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 标签字体文件
  #[arg(long, value_name = "FONT")]
  pub font: Option<PathBuf>,
  /// 推理次数，前两次作为预热不计入平均值
  #[arg(long, default_value_t = 1000, value_name = "TIMES")]
  pub repeat: usize,
  /// 每次推理都渲染输出
  #[arg(long)]
  pub render_each: bool,

  #[command(flatten)]
  pub detect: DetectArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let network = NetworkWrapper::from_url(&args.model)?;
  let model = Yolov5::new(network, args.detect.class_list()?, args.detect.config())?;
  let mut output = OutputWrapper::from_url(&args.output)?;
  if let Some(font) = &args.font {
    output = output.with_font_file(font);
  }

  RepeatShotTask::default()
    .with_repeat(args.repeat)
    .with_render(args.render_each)
    .run_task(input, model, output)?;

  Ok(())
}
