// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/classify.rs - 量化分类输出后处理
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

use std::cmp::Ordering;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  detect::softmax,
  model::{ModelOutputs, PostProcess},
  quant::{QuantError, QuantizedTensor},
};

const DEFAULT_TOP_K: usize = 5;

#[derive(Error, Debug)]
pub enum ClassifyError {
  #[error("模型路径错误: {0}")]
  SchemeMismatch(String),
  #[error("参数 {key} 无效: {value}")]
  InvalidParam { key: String, value: String },
  #[error("模型没有第 {0} 个输出")]
  MissingOutput(usize),
  #[error("量化张量错误: {0}")]
  Quant(#[from] QuantError),
}

impl ClassifyError {
  fn invalid(key: &str, value: &str) -> Self {
    ClassifyError::InvalidParam {
      key: key.to_string(),
      value: value.to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifyItem {
  pub class_id: u32,
  pub prob: f32,
}

/// 按概率降序排列的前 k 个类别
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifyResult {
  pub items: Box<[ClassifyItem]>,
}

impl ClassifyResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

// 概率降序，同概率时类别编号小的在前
fn rank(a: &ClassifyItem, b: &ClassifyItem) -> Ordering {
  b.prob
    .total_cmp(&a.prob)
    .then(a.class_id.cmp(&b.class_id))
}

/// 取概率最高的 `k` 个类别，`k` 超过类别数时返回全部
pub fn top_k(probs: &[f32], k: usize) -> Vec<ClassifyItem> {
  let mut items = probs
    .iter()
    .enumerate()
    .map(|(i, &prob)| ClassifyItem {
      class_id: i as u32,
      prob,
    })
    .collect::<Vec<_>>();

  let k = k.min(items.len());
  if k == 0 {
    return Vec::new();
  }
  if k < items.len() {
    items.select_nth_unstable_by(k - 1, rank);
    items.truncate(k);
  }
  items.sort_by(rank);
  items
}

/// 分类后处理构建器
///
/// `classify://?top=5&output=0`：`output` 为 logits 所在的输出索引。
#[derive(Debug, Clone)]
pub struct ClassifierBuilder {
  top_k: usize,
  output_index: usize,
}

impl Default for ClassifierBuilder {
  fn default() -> Self {
    Self {
      top_k: DEFAULT_TOP_K,
      output_index: 0,
    }
  }
}

fn parse_count(key: &str, value: &str) -> Result<usize, ClassifyError> {
  value.parse().map_err(|_| {
    error!("参数 {} 无法解析: {}", key, value);
    ClassifyError::invalid(key, value)
  })
}

impl FromUrlWithScheme for ClassifierBuilder {
  const SCHEME: &'static str = "classify";
}

impl FromUrl for ClassifierBuilder {
  type Error = ClassifyError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ClassifyError::SchemeMismatch(format!(
        "模型配置必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let mut builder = ClassifierBuilder::default();
    for (key, value) in url.query_pairs() {
      match &*key {
        "top" => builder.top_k = parse_count(&key, &value)?,
        "output" => builder.output_index = parse_count(&key, &value)?,
        _ => debug!("忽略未知参数: {}={}", key, value),
      }
    }

    Ok(builder)
  }
}

impl ClassifierBuilder {
  pub fn top_k(mut self, top_k: usize) -> Self {
    self.top_k = top_k;
    self
  }

  pub fn output_index(mut self, output_index: usize) -> Self {
    self.output_index = output_index;
    self
  }

  pub fn build<Frame>(self) -> Result<Classifier<Frame>, ClassifyError> {
    if self.top_k == 0 {
      return Err(ClassifyError::invalid("top", "0"));
    }

    info!(
      "分类后处理: 输出 {}, 前 {} 个类别",
      self.output_index, self.top_k
    );

    Ok(Classifier {
      top_k: self.top_k,
      output_index: self.output_index,
      _phantom: std::marker::PhantomData,
    })
  }
}

pub struct Classifier<Frame> {
  top_k: usize,
  output_index: usize,
  _phantom: std::marker::PhantomData<Frame>,
}

impl<Frame> Classifier<Frame> {
  pub fn top_k(&self) -> usize {
    self.top_k
  }
}

impl<Frame: ModelOutputs> PostProcess for Classifier<Frame> {
  type Input = Frame;
  type Output = ClassifyResult;
  type Error = ClassifyError;

  fn process(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let output = input
      .output(self.output_index)
      .ok_or(ClassifyError::MissingOutput(self.output_index))?;
    let tensor = QuantizedTensor::new(output.data, output.quant, output.dims)?;
    debug!(
      "分类输出 {}: {:?}, scale={}, zp={}",
      output.index,
      tensor.shape(),
      tensor.scale(),
      tensor.zero_point()
    );

    let logits = tensor
      .raw()
      .iter()
      .map(|&raw| tensor.dequantize(raw))
      .collect::<Vec<_>>();
    let mut probs = Vec::with_capacity(logits.len());
    softmax(&logits, &mut probs);

    Ok(ClassifyResult {
      items: top_k(&probs, self.top_k).into_boxed_slice(),
    })
  }
}
