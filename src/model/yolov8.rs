// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 量化输出后处理
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

use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detect::{self, DecodeConfig, DecodeError},
  model::{DetectResult, ModelOutputs, PostProcess, bind_branches},
};

const YOLOV8_INPUT_SIZE: usize = 640;

#[derive(Error, Debug)]
pub enum Yolov8Error {
  #[error("模型路径错误: {0}")]
  SchemeMismatch(String),
  #[error("参数 {key} 无效: {value}")]
  InvalidParam { key: String, value: String },
  #[error("解码错误: {0}")]
  DecodeError(#[from] DecodeError),
}

impl Yolov8Error {
  fn invalid(key: &str, value: &str) -> Self {
    Yolov8Error::InvalidParam {
      key: key.to_string(),
      value: value.to_string(),
    }
  }
}

/// YOLOv8 后处理构建器
///
/// `yolov8://?conf=0.25&iou=0.45&classes=80&bins=16&input=640&gate=true&parallel=false`，
/// 未给出的参数使用默认值。
#[derive(Debug, Clone)]
pub struct Yolov8Builder {
  config: DecodeConfig,
  input_size: usize,
}

impl Default for Yolov8Builder {
  fn default() -> Self {
    Self {
      config: DecodeConfig::default(),
      input_size: YOLOV8_INPUT_SIZE,
    }
  }
}

fn parse_param<T: FromStr>(key: &str, value: &str) -> Result<T, Yolov8Error> {
  value.parse().map_err(|_| {
    error!("参数 {} 无法解析: {}", key, value);
    Yolov8Error::invalid(key, value)
  })
}

impl FromUrlWithScheme for Yolov8Builder {
  const SCHEME: &'static str = "yolov8";
}

impl FromUrl for Yolov8Builder {
  type Error = Yolov8Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolov8Error::SchemeMismatch(format!(
        "模型配置必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = Yolov8Builder::default();
    for (key, value) in url.query_pairs() {
      match &*key {
        "conf" => builder.config.conf_threshold = parse_param(&key, &value)?,
        "iou" => builder.config.nms_threshold = parse_param(&key, &value)?,
        "classes" => builder.config.num_classes = parse_param(&key, &value)?,
        "bins" => builder.config.dfl_bins = parse_param(&key, &value)?,
        "gate" => builder.config.use_gate = parse_param(&key, &value)?,
        "parallel" => builder.config.parallel = parse_param(&key, &value)?,
        "input" => builder.input_size = parse_param(&key, &value)?,
        _ => debug!("忽略未知参数: {}={}", key, value),
      }
    }

    Ok(builder)
  }
}

impl Yolov8Builder {
  pub fn config(mut self, config: DecodeConfig) -> Self {
    self.config = config;
    self
  }

  pub fn input_size(mut self, input_size: usize) -> Self {
    self.input_size = input_size;
    self
  }

  pub fn build<Frame>(self) -> Result<Yolov8<Frame>, Yolov8Error> {
    self.config.validate()?;
    if self.input_size == 0 {
      return Err(Yolov8Error::invalid("input", "0"));
    }

    info!(
      "YOLOv8 后处理: 输入 {}, 类别 {}, DFL {}, 置信度阈值 {}, NMS 阈值 {}",
      self.input_size,
      self.config.num_classes,
      self.config.dfl_bins,
      self.config.conf_threshold,
      self.config.nms_threshold
    );

    Ok(Yolov8 {
      config: self.config,
      input_size: self.input_size,
      _phantom: std::marker::PhantomData,
    })
  }
}

pub struct Yolov8<Frame> {
  config: DecodeConfig,
  input_size: usize,
  _phantom: std::marker::PhantomData<Frame>,
}

impl<Frame> Yolov8<Frame> {
  pub fn config(&self) -> &DecodeConfig {
    &self.config
  }

  pub fn input_size(&self) -> usize {
    self.input_size
  }
}

impl<Frame: ModelOutputs> PostProcess for Yolov8<Frame> {
  type Input = Frame;
  type Output = DetectResult;
  type Error = Yolov8Error;

  fn process(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    debug!("绑定模型输出, 共 {} 个", input.num_outputs());
    let branches = bind_branches(input, &self.config, self.input_size)?;
    let result = detect::postprocess(&branches, &self.config)?;
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builder_from_url_reads_query() {
    let url = Url::parse("yolov8://?conf=0.5&iou=0.6&classes=3&bins=8&input=320&gate=false&parallel=true")
      .unwrap();
    let builder = Yolov8Builder::from_url(&url).unwrap();
    assert_eq!(builder.config.conf_threshold, 0.5);
    assert_eq!(builder.config.nms_threshold, 0.6);
    assert_eq!(builder.config.num_classes, 3);
    assert_eq!(builder.config.dfl_bins, 8);
    assert!(!builder.config.use_gate);
    assert!(builder.config.parallel);
    assert_eq!(builder.input_size, 320);
  }

  #[test]
  fn builder_defaults() {
    let url = Url::parse("yolov8://default").unwrap();
    let model = Yolov8Builder::from_url(&url)
      .unwrap()
      .build::<()>()
      .unwrap();
    assert_eq!(model.config(), &DecodeConfig::default());
    assert_eq!(model.input_size(), 640);
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("yolo26:///model.rknn").unwrap();
    assert!(matches!(
      Yolov8Builder::from_url(&url),
      Err(Yolov8Error::SchemeMismatch(_))
    ));
  }

  #[test]
  fn bad_param_is_rejected() {
    let url = Url::parse("yolov8://?conf=abc").unwrap();
    assert!(matches!(
      Yolov8Builder::from_url(&url),
      Err(Yolov8Error::InvalidParam { .. })
    ));

    let url = Url::parse("yolov8://?classes=0").unwrap();
    assert!(matches!(
      Yolov8Builder::from_url(&url).unwrap().build::<()>(),
      Err(Yolov8Error::DecodeError(DecodeError::InvalidConfig(_)))
    ));
  }

  #[test]
  fn overflowing_bins_fail_at_build() {
    let url = Url::parse("yolov8://?classes=3&input=16&bins=4611686018427387904").unwrap();
    assert!(matches!(
      Yolov8Builder::from_url(&url).unwrap().build::<()>(),
      Err(Yolov8Error::DecodeError(DecodeError::InvalidConfig(_)))
    ));
  }
}
