// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolov5.rs - YOLOv5 检测流程
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
use tracing::debug;

use crate::{
  frame::Frame,
  model::{
    ClassList, ConfigError, DetectConfig, DetectResult, Detection, Model, Network, OutputTensor,
    decode::{DecodeError, decode},
    letterbox::{letterbox, scale_factors, to_network_input},
    nms::nms,
  },
};

#[derive(Error, Debug)]
pub enum Yolov5Error {
  #[error("配置错误: {0}")]
  ConfigError(#[from] ConfigError),
  #[error("解码错误: {0}")]
  DecodeError(#[from] DecodeError),
  #[error("推理错误: {0}")]
  NetworkError(Box<dyn std::error::Error + Send + Sync>),
  #[error("输入图像为空")]
  EmptyImage,
}

/// 单输出张量的 YOLOv5 检测器
pub struct Yolov5<N> {
  network: N,
  classes: Arc<ClassList>,
  config: DetectConfig,
}

impl<N: Network> Yolov5<N> {
  pub fn new(network: N, classes: ClassList, config: DetectConfig) -> Result<Self, Yolov5Error> {
    config.validate()?;
    if classes.is_empty() {
      return Err(DecodeError::NoClasses.into());
    }

    debug!(
      "YOLOv5 检测器: 类别 {} 个, 输入 {}x{}, 配置 {:?}",
      classes.len(),
      config.input_width,
      config.input_height,
      config
    );

    Ok(Self {
      network,
      classes: Arc::new(classes),
      config,
    })
  }

  pub fn config(&self) -> &DetectConfig {
    &self.config
  }

  pub fn classes(&self) -> &Arc<ClassList> {
    &self.classes
  }

  /// 信箱填充 → 网络推理 → 解码 → NMS
  pub fn detect(&mut self, image: &RgbImage) -> Result<DetectResult, Yolov5Error> {
    if image.width() == 0 || image.height() == 0 {
      return Err(Yolov5Error::EmptyImage);
    }

    let canvas = letterbox(image);
    let (x_factor, y_factor) =
      scale_factors(&canvas, self.config.input_width, self.config.input_height);
    let input = to_network_input(&canvas, self.config.input_width, self.config.input_height);

    let output = self
      .network
      .forward(&input)
      .map_err(|e| Yolov5Error::NetworkError(Box::new(e)))?;
    debug!("模型输出形状: {:?}", output.shape);

    Self::postprocess(&output, &self.classes, &self.config, x_factor, y_factor)
  }

  /// 不经过网络，直接从输出张量得到检测结果
  pub fn postprocess(
    output: &OutputTensor,
    classes: &Arc<ClassList>,
    config: &DetectConfig,
    x_factor: f32,
    y_factor: f32,
  ) -> Result<DetectResult, Yolov5Error> {
    let candidates = decode(output, classes.len(), config, x_factor, y_factor)?;
    let kept = nms(&candidates, config);

    let items = kept
      .into_iter()
      .map(|idx| Detection {
        class_id: candidates.class_ids[idx],
        confidence: candidates.confidences[idx],
        bbox: candidates.boxes[idx],
      })
      .collect::<Vec<_>>();

    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      classes: Arc::clone(classes),
    })
  }
}

impl<N: Network> Model for Yolov5<N> {
  type Input = Frame;
  type Output = DetectResult;
  type Error = Yolov5Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.detect(&input.image)
  }
}

#[cfg(test)]
mod tests {
  use std::convert::Infallible;

  use super::*;
  use crate::model::{BoundingBox, decode::row_dimensions};

  const NUM_CLASSES: usize = 3;

  /// 返回固定张量并记录输入尺寸
  struct FixedNetwork {
    output: OutputTensor,
    seen: Vec<(u32, u32)>,
  }

  impl Network for FixedNetwork {
    type Error = Infallible;

    fn forward(&mut self, input: &RgbImage) -> Result<OutputTensor, Self::Error> {
      self.seen.push(input.dimensions());
      Ok(self.output.clone())
    }
  }

  fn classes() -> ClassList {
    ClassList::new(vec!["a".into(), "b".into(), "c".into()])
  }

  fn detector(rows: Vec<[f32; 8]>) -> Yolov5<FixedNetwork> {
    let dims = row_dimensions(NUM_CLASSES);
    let output = OutputTensor::new(
      vec![1, rows.len(), dims],
      rows.iter().flatten().copied().collect(),
    );
    let network = FixedNetwork {
      output,
      seen: Vec::new(),
    };
    Yolov5::new(network, classes(), DetectConfig::default()).unwrap()
  }

  #[test]
  fn single_row_end_to_end() {
    let mut detector = detector(vec![[320.0, 320.0, 100.0, 50.0, 0.9, 0.0, 0.0, 0.8]]);
    let result = detector.detect(&RgbImage::new(640, 640)).unwrap();

    assert_eq!(
      result.items.as_ref(),
      &[Detection {
        class_id: 2,
        confidence: 0.9,
        bbox: BoundingBox::new(270, 295, 100, 50),
      }]
    );
    assert_eq!(result.label(&result.items[0]), "c");
    assert_eq!(detector.network.seen, vec![(640, 640)]);
  }

  #[test]
  fn identical_boxes_of_different_classes_suppress() {
    let mut detector = detector(vec![
      [320.0, 320.0, 100.0, 50.0, 0.9, 0.7, 0.0, 0.0],
      [320.0, 320.0, 100.0, 50.0, 0.5, 0.0, 0.7, 0.0],
    ]);
    let result = detector.detect(&RgbImage::new(640, 640)).unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].class_id, 0);
    assert_eq!(result.items[0].confidence, 0.9);
  }

  #[test]
  fn wide_image_is_letterboxed_and_rescaled() {
    // 1280x640 填充为 1280x1280，缩放系数为 2
    let mut detector = detector(vec![[100.0, 50.0, 40.0, 20.0, 0.8, 0.9, 0.0, 0.0]]);
    let result = detector.detect(&RgbImage::new(1280, 640)).unwrap();

    assert_eq!(detector.network.seen, vec![(640, 640)]);
    assert_eq!(result.items[0].bbox, BoundingBox::new(160, 80, 80, 40));
  }

  #[test]
  fn infer_uses_frame_image() {
    let mut detector = detector(vec![[320.0, 320.0, 100.0, 50.0, 0.9, 0.0, 0.0, 0.8]]);
    let frame = Frame::new(RgbImage::new(320, 320), 3, 100);
    let result = detector.infer(&frame).unwrap();
    // 320 画布缩放系数为 0.5
    assert_eq!(result.items[0].bbox, BoundingBox::new(135, 147, 50, 25));
  }

  #[test]
  fn empty_image_is_rejected() {
    let mut detector = detector(vec![]);
    assert!(matches!(
      detector.detect(&RgbImage::new(0, 0)),
      Err(Yolov5Error::EmptyImage)
    ));
  }

  #[test]
  fn class_count_mismatch_fails_fast() {
    let output = OutputTensor::new(vec![1, 1, 85], vec![0.0; 85]);
    let classes = Arc::new(classes());
    let result = Yolov5::<FixedNetwork>::postprocess(&output, &classes, &DetectConfig::default(), 1.0, 1.0);
    assert!(matches!(
      result,
      Err(Yolov5Error::DecodeError(DecodeError::DimensionMismatch { .. }))
    ));
  }

  #[test]
  fn empty_class_list_is_rejected() {
    let network = FixedNetwork {
      output: OutputTensor::default(),
      seen: Vec::new(),
    };
    assert!(matches!(
      Yolov5::new(network, ClassList::new(vec![]), DetectConfig::default()),
      Err(Yolov5Error::DecodeError(DecodeError::NoClasses))
    ));
  }
}
