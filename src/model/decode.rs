// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decode.rs - YOLOv5 输出张量解码
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

//! 每行布局为 `[cx, cy, w, h, objectness, class_0 .. class_{n-1}]`，
//! 坐标单位为网络输入像素。

use thiserror::Error;
use tracing::debug;

use crate::model::{BoundingBox, ConfidencePolicy, DetectConfig, OutputTensor};

/// 框坐标与目标置信度之前的固定列数
pub const BOX_ATTRIBUTES: usize = 5;
const OBJECTNESS_OFFSET: usize = 4;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("类别列表为空")]
  NoClasses,
  #[error("输出张量与类别数不匹配: 每行期望 {expected} 个值, 张量形状 {shape:?}, 数据长度 {len}")]
  DimensionMismatch {
    expected: usize,
    shape: Vec<usize>,
    len: usize,
  },
}

/// NMS 之前的候选框，三个序列等长且按行序排列
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates {
  pub class_ids: Vec<usize>,
  pub confidences: Vec<f32>,
  pub boxes: Vec<BoundingBox>,
}

impl Candidates {
  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  fn push(&mut self, class_id: usize, confidence: f32, bbox: BoundingBox) {
    self.class_ids.push(class_id);
    self.confidences.push(confidence);
    self.boxes.push(bbox);
  }
}

/// 每行的值个数
pub fn row_dimensions(num_classes: usize) -> usize {
  BOX_ATTRIBUTES + num_classes
}

fn check_layout(tensor: &OutputTensor, dimensions: usize) -> Result<(), DecodeError> {
  let shape_ok = tensor.shape.len() < 2 || tensor.shape.last() == Some(&dimensions);
  if !shape_ok || tensor.data.len() % dimensions != 0 {
    return Err(DecodeError::DimensionMismatch {
      expected: dimensions,
      shape: tensor.shape.clone(),
      len: tensor.data.len(),
    });
  }
  Ok(())
}

/// 最大分数及其下标，分数相同时取第一个
fn argmax(scores: &[f32]) -> (usize, f32) {
  let mut best = (0usize, f32::MIN);
  for (idx, &score) in scores.iter().enumerate() {
    if score > best.1 {
      best = (idx, score);
    }
  }
  best
}

/// 解码输出张量为候选框，框坐标为信箱画布像素
pub fn decode(
  tensor: &OutputTensor,
  num_classes: usize,
  config: &DetectConfig,
  x_factor: f32,
  y_factor: f32,
) -> Result<Candidates, DecodeError> {
  if num_classes == 0 {
    return Err(DecodeError::NoClasses);
  }

  let dimensions = row_dimensions(num_classes);
  check_layout(tensor, dimensions)?;

  let mut candidates = Candidates::default();
  for row in tensor.data.chunks_exact(dimensions) {
    let objectness = row[OBJECTNESS_OFFSET];
    // NaN 同样丢弃
    if !(objectness >= config.confidence_threshold) {
      continue;
    }

    let (class_id, max_class_score) = argmax(&row[BOX_ATTRIBUTES..]);
    if max_class_score <= config.score_threshold {
      continue;
    }

    let confidence = match config.confidence_policy {
      ConfidencePolicy::Objectness => objectness,
      ConfidencePolicy::ObjectnessTimesClass => objectness * max_class_score,
    };

    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
    let bbox = BoundingBox {
      x: ((cx - 0.5 * w) * x_factor) as i32,
      y: ((cy - 0.5 * h) * y_factor) as i32,
      width: (w * x_factor) as i32,
      height: (h * y_factor) as i32,
    };

    candidates.push(class_id, confidence, bbox);
  }

  debug!(
    "解码 {} 行, 候选框 {} 个",
    tensor.data.len() / dimensions,
    candidates.len()
  );

  Ok(candidates)
}

#[cfg(test)]
mod tests {
  use super::*;

  const NUM_CLASSES: usize = 4;

  fn row(center: (f32, f32), size: (f32, f32), objectness: f32, scores: [f32; NUM_CLASSES]) -> Vec<f32> {
    let mut row = vec![center.0, center.1, size.0, size.1, objectness];
    row.extend_from_slice(&scores);
    row
  }

  fn tensor(rows: &[Vec<f32>]) -> OutputTensor {
    let data: Vec<f32> = rows.iter().flatten().copied().collect();
    OutputTensor::new(vec![1, rows.len(), row_dimensions(NUM_CLASSES)], data)
  }

  #[test]
  fn low_objectness_is_rejected_regardless_of_scores() {
    let config = DetectConfig::default();
    let rows: Vec<Vec<f32>> = [0.0, 0.1, 0.39, 0.3999]
      .iter()
      .map(|&obj| row((100.0, 100.0), (10.0, 10.0), obj, [1.0, 1.0, 1.0, 1.0]))
      .collect();
    let candidates = decode(&tensor(&rows), NUM_CLASSES, &config, 1.0, 1.0).unwrap();
    assert!(candidates.is_empty());
  }

  #[test]
  fn nan_objectness_is_rejected() {
    let config = DetectConfig::default();
    let rows = vec![row((100.0, 100.0), (10.0, 10.0), f32::NAN, [0.9, 0.0, 0.0, 0.0])];
    let candidates = decode(&tensor(&rows), NUM_CLASSES, &config, 1.0, 1.0).unwrap();
    assert!(candidates.is_empty());
  }

  #[test]
  fn objectness_at_threshold_passes() {
    let config = DetectConfig::default();
    let rows = vec![row((100.0, 100.0), (10.0, 10.0), 0.4, [0.0, 0.9, 0.0, 0.0])];
    let candidates = decode(&tensor(&rows), NUM_CLASSES, &config, 1.0, 1.0).unwrap();
    assert_eq!(candidates.class_ids, vec![1]);
  }

  #[test]
  fn class_score_must_strictly_exceed_threshold() {
    let config = DetectConfig::default();
    let rows = vec![
      row((100.0, 100.0), (10.0, 10.0), 0.9, [0.2, 0.1, 0.0, 0.0]),
      row((100.0, 100.0), (10.0, 10.0), 0.9, [0.0, 0.0, 0.21, 0.0]),
    ];
    let candidates = decode(&tensor(&rows), NUM_CLASSES, &config, 1.0, 1.0).unwrap();
    assert_eq!(candidates.class_ids, vec![2]);
    assert_eq!(candidates.confidences, vec![0.9]);
  }

  #[test]
  fn confidence_is_objectness_by_default() {
    let mut config = DetectConfig::default();
    let rows = vec![row((320.0, 320.0), (100.0, 50.0), 0.9, [0.0, 0.0, 0.5, 0.0])];
    let candidates = decode(&tensor(&rows), NUM_CLASSES, &config, 1.0, 1.0).unwrap();
    assert_eq!(candidates.confidences, vec![0.9]);

    config.confidence_policy = ConfidencePolicy::ObjectnessTimesClass;
    let candidates = decode(&tensor(&rows), NUM_CLASSES, &config, 1.0, 1.0).unwrap();
    assert!((candidates.confidences[0] - 0.45).abs() < 1e-6);
  }

  #[test]
  fn box_is_scaled_into_canvas_space() {
    let config = DetectConfig::default();
    let rows = vec![row((320.0, 320.0), (100.0, 50.0), 0.9, [0.0, 0.0, 0.8, 0.0])];
    let candidates = decode(&tensor(&rows), NUM_CLASSES, &config, 2.0, 1.5).unwrap();
    assert_eq!(candidates.boxes, vec![BoundingBox::new(540, 442, 200, 75)]);
  }

  #[test]
  fn candidates_keep_row_order() {
    let config = DetectConfig::default();
    let rows = vec![
      row((50.0, 50.0), (10.0, 10.0), 0.5, [0.0, 0.0, 0.0, 0.9]),
      row((60.0, 60.0), (10.0, 10.0), 0.1, [0.9, 0.0, 0.0, 0.0]),
      row((70.0, 70.0), (10.0, 10.0), 0.8, [0.9, 0.0, 0.0, 0.0]),
    ];
    let candidates = decode(&tensor(&rows), NUM_CLASSES, &config, 1.0, 1.0).unwrap();
    assert_eq!(candidates.class_ids, vec![3, 0]);
    assert_eq!(candidates.confidences, vec![0.5, 0.8]);
    assert_eq!(candidates.boxes[1], BoundingBox::new(65, 65, 10, 10));
  }

  #[test]
  fn mismatched_row_width_fails_fast() {
    let config = DetectConfig::default();
    let rows = vec![row((50.0, 50.0), (10.0, 10.0), 0.5, [0.0, 0.0, 0.0, 0.9])];
    let result = decode(&tensor(&rows), NUM_CLASSES + 1, &config, 1.0, 1.0);
    assert!(matches!(
      result,
      Err(DecodeError::DimensionMismatch { expected: 10, .. })
    ));

    // 无形状信息时按数据长度校验
    let flat = OutputTensor::new(vec![], vec![0.0; 13]);
    assert!(decode(&flat, NUM_CLASSES, &config, 1.0, 1.0).is_err());
  }

  #[test]
  fn empty_class_list_is_rejected() {
    let config = DetectConfig::default();
    let flat = OutputTensor::new(vec![], vec![0.0; 5]);
    assert_eq!(
      decode(&flat, 0, &config, 1.0, 1.0),
      Err(DecodeError::NoClasses)
    );
  }

  #[test]
  fn argmax_prefers_first_maximum() {
    assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), (1, 0.7));
  }
}
