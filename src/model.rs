// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use image::RgbImage;
use thiserror::Error;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 推理后端：输入为网络尺寸的 RGB 图像，输出为单个浮点张量
pub trait Network {
  type Error: std::error::Error + Send + Sync + 'static;

  fn forward(&mut self, input: &RgbImage) -> Result<OutputTensor, Self::Error>;
}

/// 网络输出张量，行优先存储
#[derive(Debug, Clone, Default)]
pub struct OutputTensor {
  pub shape: Vec<usize>,
  pub data: Vec<f32>,
}

impl OutputTensor {
  pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
    Self { shape, data }
  }
}

/// 轴对齐矩形，左上角为原点，单位为原图像素
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl BoundingBox {
  pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn area(&self) -> i64 {
    if self.width <= 0 || self.height <= 0 {
      return 0;
    }
    self.width as i64 * self.height as i64
  }

  pub fn intersection(&self, other: &Self) -> i64 {
    let x1 = self.x.max(other.x) as i64;
    let y1 = self.y.max(other.y) as i64;
    let x2 = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
    let y2 = (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);

    (x2 - x1).max(0) * (y2 - y1).max(0)
  }

  /// 交并比，范围 [0, 1]
  pub fn iou(&self, other: &Self) -> f32 {
    let intersection = self.intersection(other);
    let union = self.area() + other.area() - intersection;

    if union > 0 {
      intersection as f32 / union as f32
    } else {
      0.0
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub class_id: usize,
  pub confidence: f32,
  pub bbox: BoundingBox,
}

#[derive(Debug, Clone)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
  pub classes: Arc<ClassList>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn label(&self, item: &Detection) -> &str {
    self.classes.name(item.class_id).unwrap_or("unknown")
  }
}

/// 抑制策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum NmsMode {
  /// 跨类别抑制
  #[default]
  Global,
  /// 仅在同一类别内抑制
  PerClass,
}

/// 最终置信度的取值方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ConfidencePolicy {
  /// 直接使用目标置信度
  #[default]
  Objectness,
  /// 目标置信度乘以最大类别分数
  ObjectnessTimesClass,
}

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.4;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.2;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
pub const DEFAULT_INPUT_WIDTH: u32 = 640;
pub const DEFAULT_INPUT_HEIGHT: u32 = 640;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectConfig {
  /// 目标置信度阈值，低于该值的行直接跳过
  pub confidence_threshold: f32,
  /// 类别分数阈值，同时作为 NMS 的置信度下限
  pub score_threshold: f32,
  /// NMS IoU 阈值
  pub nms_threshold: f32,
  pub input_width: u32,
  pub input_height: u32,
  pub nms_mode: NmsMode,
  pub confidence_policy: ConfidencePolicy,
  pub max_detections: Option<usize>,
}

impl Default for DetectConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      input_width: DEFAULT_INPUT_WIDTH,
      input_height: DEFAULT_INPUT_HEIGHT,
      nms_mode: NmsMode::default(),
      confidence_policy: ConfidencePolicy::default(),
      max_detections: None,
    }
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("阈值 {name} 超出范围 [0, 1]: {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
  #[error("网络输入尺寸无效: {0}x{1}")]
  InvalidInputSize(u32, u32),
}

impl DetectConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, value) in [
      ("confidence", self.confidence_threshold),
      ("score", self.score_threshold),
      ("nms", self.nms_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
      }
    }

    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::InvalidInputSize(
        self.input_width,
        self.input_height,
      ));
    }

    Ok(())
  }
}

mod backend;
mod classes;
pub mod decode;
pub mod letterbox;
pub mod nms;
mod yolov5;

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "rknn")]
mod rknn;

pub use self::backend::{NetworkError, NetworkWrapper};
pub use self::classes::{COCO_CLASSES, ClassList, ClassListError};
pub use self::yolov5::{Yolov5, Yolov5Error};

#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxNetwork, OnnxNetworkError};
#[cfg(feature = "rknn")]
pub use self::rknn::{RknnNetwork, RknnNetworkError};
