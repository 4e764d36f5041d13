// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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
use ndarray::Array4;
use ort::{session::Session, value::TensorRef};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Network, OutputTensor},
  url_path, url_query,
};

#[derive(Error, Debug)]
pub enum OnnxNetworkError {
  #[error("ONNX Runtime 错误: {0}")]
  OrtError(#[from] ort::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("模型没有输出张量")]
  NoOutput,
  #[error("输出张量形状无效: {0:?}")]
  InvalidShape(Vec<i64>),
}

/// 基于 `ort` 的 YOLOv5 ONNX 模型，例如 `yolov5s.onnx`
pub struct OnnxNetwork {
  session: Session,
}

impl FromUrlWithScheme for OnnxNetwork {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxNetwork {
  type Error = OnnxNetworkError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxNetworkError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let cuda = url_query(url, "device").is_some_and(|device| device == "cuda");
    Self::load(&url_path(url), cuda)
  }
}

impl OnnxNetwork {
  pub fn load(model_path: &str, cuda: bool) -> Result<Self, OnnxNetworkError> {
    info!("加载模型文件: {}", model_path);

    #[allow(unused_mut)]
    let mut builder = Session::builder()?;

    if cuda {
      #[cfg(feature = "cuda")]
      {
        info!("尝试使用 CUDA 推理");
        builder = builder.with_execution_providers([
          ort::execution_providers::CUDAExecutionProvider::default().build(),
        ])?;
      }
      #[cfg(not(feature = "cuda"))]
      warn!("未启用 cuda 特性, 使用 CPU 推理");
    } else {
      info!("使用 CPU 推理");
    }

    let session = builder.commit_from_file(model_path)?;
    info!("模型加载完成");

    Ok(Self { session })
  }
}

/// NHWC 字节转为归一化到 [0, 1] 的 NCHW 浮点张量，通道顺序为 RGB
fn to_blob(image: &RgbImage) -> Array4<f32> {
  let (width, height) = image.dimensions();
  Array4::from_shape_fn((1, 3, height as usize, width as usize), |(_, c, y, x)| {
    image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
  })
}

impl Network for OnnxNetwork {
  type Error = OnnxNetworkError;

  fn forward(&mut self, input: &RgbImage) -> Result<OutputTensor, Self::Error> {
    let blob = to_blob(input);
    let input_tensor = TensorRef::from_array_view(blob.view())?;

    debug!("执行模型推理");
    let outputs = self.session.run(ort::inputs![input_tensor])?;
    if outputs.is_empty() {
      return Err(OnnxNetworkError::NoOutput);
    }

    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;
    let shape = shape
      .iter()
      .map(|&dim| usize::try_from(dim).map_err(|_| OnnxNetworkError::InvalidShape(shape.to_vec())))
      .collect::<Result<Vec<_>, _>>()?;

    Ok(OutputTensor::new(shape, data.to_vec()))
  }
}
