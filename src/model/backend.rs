// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/backend.rs - 推理后端选择
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

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl,
  model::{Network, OutputTensor},
};

#[cfg(feature = "onnx")]
use crate::model::{OnnxNetwork, OnnxNetworkError};
#[cfg(feature = "rknn")]
use crate::model::{RknnNetwork, RknnNetworkError};

#[derive(Error, Debug)]
pub enum NetworkError {
  #[cfg(feature = "onnx")]
  #[error("ONNX 后端错误: {0}")]
  OnnxNetworkError(#[from] OnnxNetworkError),
  #[cfg(feature = "rknn")]
  #[error("RKNN 后端错误: {0}")]
  RknnNetworkError(#[from] RknnNetworkError),
  #[error("不支持的模型方案: {0}")]
  SchemeMismatch(String),
}

/// 按模型 URL 方案选择的推理后端
///
/// - `onnx:///path/to/yolov5s.onnx?device=cuda`
/// - `rknn:///path/to/yolov5s.rknn`
pub enum NetworkWrapper {
  #[cfg(feature = "onnx")]
  Onnx(OnnxNetwork),
  #[cfg(feature = "rknn")]
  Rknn(RknnNetwork),
}

impl FromUrl for NetworkWrapper {
  type Error = NetworkError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(any(feature = "onnx", feature = "rknn"))]
    use crate::FromUrlWithScheme;

    match url.scheme() {
      #[cfg(feature = "onnx")]
      OnnxNetwork::SCHEME => Ok(NetworkWrapper::Onnx(OnnxNetwork::from_url(url)?)),
      #[cfg(feature = "rknn")]
      RknnNetwork::SCHEME => Ok(NetworkWrapper::Rknn(RknnNetwork::from_url(url)?)),
      scheme => Err(NetworkError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl Network for NetworkWrapper {
  type Error = NetworkError;

  fn forward(&mut self, input: &RgbImage) -> Result<OutputTensor, Self::Error> {
    match self {
      #[cfg(feature = "onnx")]
      NetworkWrapper::Onnx(network) => network.forward(input).map_err(NetworkError::from),
      #[cfg(feature = "rknn")]
      NetworkWrapper::Rknn(network) => network.forward(input).map_err(NetworkError::from),
      #[allow(unreachable_patterns)]
      _ => {
        let _ = input;
        Err(NetworkError::SchemeMismatch("none".to_string()))
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_model_scheme_is_rejected() {
    let url = Url::parse("tflite:///models/yolov5s.tflite").unwrap();
    assert!(matches!(
      NetworkWrapper::from_url(&url),
      Err(NetworkError::SchemeMismatch(scheme)) if scheme == "tflite"
    ));
  }
}
