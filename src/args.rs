// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 检测参数配置
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

use clap::Args;
use tracing::info;

use crate::model::{
  ClassList, ClassListError, ConfidencePolicy, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_INPUT_HEIGHT,
  DEFAULT_INPUT_WIDTH, DEFAULT_NMS_THRESHOLD, DEFAULT_SCORE_THRESHOLD, DetectConfig, NmsMode,
};

/// 各程序共用的检测参数
#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
  /// 类别名称文件（每行一个），缺省使用 COCO 80 类
  #[arg(long, value_name = "FILE")]
  pub classes: Option<PathBuf>,

  /// 目标置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_CONFIDENCE_THRESHOLD, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 类别分数阈值，同时作为 NMS 置信度下限 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD, value_name = "THRESHOLD")]
  pub score: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_NMS_THRESHOLD, value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 网络输入宽度
  #[arg(long, default_value_t = DEFAULT_INPUT_WIDTH, value_name = "PIXELS")]
  pub input_width: u32,

  /// 网络输入高度
  #[arg(long, default_value_t = DEFAULT_INPUT_HEIGHT, value_name = "PIXELS")]
  pub input_height: u32,

  /// NMS 策略
  #[arg(long, value_enum, default_value_t = NmsMode::Global)]
  pub nms_mode: NmsMode,

  /// 置信度取值方式
  #[arg(long, value_enum, default_value_t = ConfidencePolicy::Objectness)]
  pub confidence_policy: ConfidencePolicy,

  /// 每帧最多保留的检测数
  #[arg(long, value_name = "COUNT")]
  pub max_detections: Option<usize>,
}

impl DetectArgs {
  pub fn config(&self) -> DetectConfig {
    DetectConfig {
      confidence_threshold: self.confidence,
      score_threshold: self.score,
      nms_threshold: self.nms_threshold,
      input_width: self.input_width,
      input_height: self.input_height,
      nms_mode: self.nms_mode,
      confidence_policy: self.confidence_policy,
      max_detections: self.max_detections,
    }
  }

  pub fn class_list(&self) -> Result<ClassList, ClassListError> {
    match &self.classes {
      Some(path) => ClassList::from_file(path),
      None => {
        info!("未指定类别文件, 使用 COCO 类别");
        Ok(ClassList::coco())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use clap::Parser;

  use super::*;

  #[derive(Parser, Debug)]
  struct TestArgs {
    #[command(flatten)]
    detect: DetectArgs,
  }

  #[test]
  fn defaults_match_detect_config() {
    let args = TestArgs::parse_from(["test"]);
    assert_eq!(args.detect.config(), DetectConfig::default());
    assert_eq!(args.detect.class_list().unwrap().len(), 80);
  }

  #[test]
  fn flags_override_config() {
    let args = TestArgs::parse_from([
      "test",
      "--confidence",
      "0.5",
      "--nms-threshold",
      "0.45",
      "--nms-mode",
      "per-class",
      "--confidence-policy",
      "objectness-times-class",
      "--max-detections",
      "10",
    ]);
    let config = args.detect.config();
    assert_eq!(config.confidence_threshold, 0.5);
    assert_eq!(config.nms_threshold, 0.45);
    assert_eq!(config.nms_mode, NmsMode::PerClass);
    assert_eq!(config.confidence_policy, ConfidencePolicy::ObjectnessTimesClass);
    assert_eq!(config.max_detections, Some(10));
  }
}
