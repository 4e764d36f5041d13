// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/classes.rs - 类别名称列表
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

use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
  "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
  "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
  "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
  "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
  "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
  "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
  "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
  "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
  "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
  "refrigerator", "book", "clock", "vase", "scissors", "teddy bear",
  "hair drier", "toothbrush",
];

#[derive(Error, Debug)]
pub enum ClassListError {
  #[error("无法读取类别文件: {0}")]
  IoError(#[from] std::io::Error),
  #[error("类别文件为空: {0}")]
  Empty(String),
}

/// 有序的类别名称表，`class_id` 为其下标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassList {
  names: Vec<String>,
}

impl ClassList {
  pub fn new(names: Vec<String>) -> Self {
    Self { names }
  }

  pub fn coco() -> Self {
    Self::new(COCO_CLASSES.iter().map(|name| name.to_string()).collect())
  }

  /// 每行一个类别名称
  pub fn parse(content: &str) -> Self {
    let names = content
      .lines()
      .map(|line| line.trim_end_matches('\r').to_string())
      .collect();
    Self { names }
  }

  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClassListError> {
    let path = path.as_ref();
    info!("加载类别文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let classes = Self::parse(&content);
    if classes.is_empty() {
      return Err(ClassListError::Empty(path.display().to_string()));
    }
    debug!("类别数量: {}", classes.len());
    Ok(classes)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }
}

impl Default for ClassList {
  fn default() -> Self {
    Self::coco()
  }
}
