// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/rknn.rs - RKNPU 推理后端
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
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{Network, OutputTensor},
  url_path,
};

const RKNN_NUM_INPUTS: u32 = 1;
const RKNN_NUM_OUTPUTS: u32 = 1;

#[derive(Error, Debug)]
pub enum RknnNetworkError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl From<rknpu::Error> for RknnNetworkError {
  fn from(err: rknpu::Error) -> Self {
    RknnNetworkError::RknnError(err)
  }
}

impl RknnNetworkError {
  fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnNetworkError::ModelInvalid(msg.to_string(), e)
  }
}

/// RKNPU 上的 YOLOv5 模型，要求单输入单输出，输入为 NHWC u8
pub struct RknnNetwork {
  context: Context,
}

impl FromUrlWithScheme for RknnNetwork {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnNetwork {
  type Error = RknnNetworkError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnNetworkError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Self::load(&url_path(url), InitFlags::default())
  }
}

impl RknnNetwork {
  pub fn load(model_path: &str, flags: InitFlags) -> Result<Self, RknnNetworkError> {
    info!("加载模型文件: {}", model_path);
    let model_data = std::fs::read(model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, flags)?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnNetworkError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnNetworkError::invalid("无法获取输出数量", e))?;

    if num_inputs != RKNN_NUM_INPUTS || num_outputs != RKNN_NUM_OUTPUTS {
      let msg = format!(
        "预期模型输入/输出数量为 {}/{}, 实际为 {}/{}",
        RKNN_NUM_INPUTS, RKNN_NUM_OUTPUTS, num_inputs, num_outputs
      );
      error!("{}", msg);
      return Err(RknnNetworkError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    info!("模型加载完成");
    Ok(Self { context })
  }
}

impl Network for RknnNetwork {
  type Error = RknnNetworkError;

  fn forward(&mut self, input: &RgbImage) -> Result<OutputTensor, Self::Error> {
    debug!("设置模型输入");
    self
      .context
      .set_input(0, input.as_raw(), TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    let data = output.get_f32(0)?.to_vec();

    // NPU 输出不带形状信息，由解码器按数据长度校验
    Ok(OutputTensor::new(vec![data.len()], data))
  }
}
