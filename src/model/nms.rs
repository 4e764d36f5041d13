// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::model::{DetectConfig, NmsMode, decode::Candidates};

/// 贪心 NMS，返回保留候选框的下标，按保留顺序排列。
///
/// 置信度不高于 `score_threshold` 的候选框不参与排序。
/// 置信度相同时按候选框下标升序。
pub fn nms(candidates: &Candidates, config: &DetectConfig) -> Vec<usize> {
  let mut order: Vec<usize> = (0..candidates.len())
    .filter(|&idx| candidates.confidences[idx] > config.score_threshold)
    .collect();

  // 稳定排序，保证相同置信度时的顺序
  order.sort_by(|&a, &b| candidates.confidences[b].total_cmp(&candidates.confidences[a]));

  let mut suppressed = vec![false; order.len()];
  let mut kept = Vec::new();

  for i in 0..order.len() {
    if suppressed[i] {
      continue;
    }

    let best = order[i];
    kept.push(best);
    if config.max_detections.is_some_and(|max| kept.len() >= max) {
      break;
    }

    for j in (i + 1)..order.len() {
      if suppressed[j] {
        continue;
      }
      let other = order[j];
      if config.nms_mode == NmsMode::PerClass
        && candidates.class_ids[other] != candidates.class_ids[best]
      {
        continue;
      }
      if candidates.boxes[best].iou(&candidates.boxes[other]) > config.nms_threshold {
        suppressed[j] = true;
      }
    }
  }

  debug!("NMS: {} 个候选框保留 {} 个", candidates.len(), kept.len());
  kept
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::BoundingBox;

  fn candidates(items: &[(usize, f32, BoundingBox)]) -> Candidates {
    Candidates {
      class_ids: items.iter().map(|item| item.0).collect(),
      confidences: items.iter().map(|item| item.1).collect(),
      boxes: items.iter().map(|item| item.2).collect(),
    }
  }

  #[test]
  fn overlapping_boxes_keep_highest_confidence_across_classes() {
    let input = candidates(&[
      (0, 0.5, BoundingBox::new(10, 10, 100, 100)),
      (1, 0.9, BoundingBox::new(12, 12, 100, 100)),
    ]);
    assert_eq!(nms(&input, &DetectConfig::default()), vec![1]);
  }

  #[test]
  fn per_class_mode_keeps_other_classes() {
    let config = DetectConfig {
      nms_mode: NmsMode::PerClass,
      ..DetectConfig::default()
    };
    let input = candidates(&[
      (0, 0.5, BoundingBox::new(10, 10, 100, 100)),
      (1, 0.9, BoundingBox::new(12, 12, 100, 100)),
      (1, 0.6, BoundingBox::new(10, 10, 100, 100)),
    ]);
    assert_eq!(nms(&input, &config), vec![1, 0]);
  }

  #[test]
  fn disjoint_boxes_all_survive() {
    let input = candidates(&[
      (0, 0.95, BoundingBox::new(0, 0, 50, 50)),
      (0, 0.25, BoundingBox::new(100, 100, 50, 50)),
    ]);
    assert_eq!(nms(&input, &DetectConfig::default()), vec![0, 1]);
  }

  #[test]
  fn iou_at_threshold_is_not_suppressed() {
    // 交集 40，并集 100，IoU 恰好 0.4
    let input = candidates(&[
      (0, 0.9, BoundingBox::new(0, 0, 10, 10)),
      (0, 0.8, BoundingBox::new(0, 0, 4, 10)),
    ]);
    assert_eq!(input.boxes[0].iou(&input.boxes[1]), 0.4);
    assert_eq!(nms(&input, &DetectConfig::default()).len(), 2);
  }

  #[test]
  fn confidence_floor_drops_candidates() {
    let input = candidates(&[
      (0, 0.2, BoundingBox::new(0, 0, 10, 10)),
      (0, 0.5, BoundingBox::new(100, 0, 10, 10)),
    ]);
    assert_eq!(nms(&input, &DetectConfig::default()), vec![1]);
  }

  #[test]
  fn equal_confidence_prefers_lower_index() {
    let input = candidates(&[
      (2, 0.7, BoundingBox::new(0, 0, 10, 10)),
      (0, 0.7, BoundingBox::new(0, 0, 10, 10)),
      (1, 0.7, BoundingBox::new(50, 50, 10, 10)),
    ]);
    assert_eq!(nms(&input, &DetectConfig::default()), vec![0, 2]);
  }

  #[test]
  fn infinite_confidence_sorts_first() {
    let input = candidates(&[
      (0, 0.6, BoundingBox::new(0, 0, 10, 10)),
      (0, f32::INFINITY, BoundingBox::new(40, 0, 10, 10)),
      (0, f32::NAN, BoundingBox::new(80, 0, 10, 10)),
      (0, 0.9, BoundingBox::new(120, 0, 10, 10)),
    ]);
    assert_eq!(nms(&input, &DetectConfig::default()), vec![1, 3, 0]);
  }

  #[test]
  fn kept_order_is_descending_confidence() {
    let input = candidates(&[
      (0, 0.3, BoundingBox::new(0, 0, 10, 10)),
      (0, 0.8, BoundingBox::new(20, 0, 10, 10)),
      (0, 0.6, BoundingBox::new(40, 0, 10, 10)),
    ]);
    assert_eq!(nms(&input, &DetectConfig::default()), vec![1, 2, 0]);
  }

  #[test]
  fn max_detections_limits_output() {
    let config = DetectConfig {
      max_detections: Some(2),
      ..DetectConfig::default()
    };
    let input = candidates(&[
      (0, 0.3, BoundingBox::new(0, 0, 10, 10)),
      (0, 0.8, BoundingBox::new(20, 0, 10, 10)),
      (0, 0.6, BoundingBox::new(40, 0, 10, 10)),
    ]);
    assert_eq!(nms(&input, &config), vec![1, 2]);
  }

  #[test]
  fn empty_input_yields_nothing() {
    assert!(nms(&Candidates::default(), &DetectConfig::default()).is_empty());
  }
}
