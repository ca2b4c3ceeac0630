// 该文件是 Shanan （山南西风） 项目的一部分。
// src/quant.rs - 量化张量视图
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

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuantError {
  #[error("量化缩放系数无效: {0}（必须为正的有限值）")]
  InvalidScale(f32),
  #[error("张量形状与数据长度不匹配: 形状 {shape:?} 共 {expected} 个元素, 实际长度 {actual}")]
  ShapeMismatch {
    shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
  #[error("张量形状元素个数溢出: {0:?}")]
  ShapeOverflow(Vec<usize>),
  #[error("张量索引越界: 索引 {index}, 长度 {len}")]
  IndexOutOfBounds { index: usize, len: usize },
}

/// 仿射量化参数: `value = (raw - zero_point) * scale`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantParams {
  pub scale: f32,
  pub zero_point: i32,
}

impl QuantParams {
  pub fn new(scale: f32, zero_point: i32) -> Result<Self, QuantError> {
    if !(scale.is_finite() && scale > 0.0) {
      return Err(QuantError::InvalidScale(scale));
    }
    Ok(Self { scale, zero_point })
  }

  #[inline]
  pub fn dequantize(&self, raw: i8) -> f32 {
    (raw as i32 - self.zero_point) as f32 * self.scale
  }

  /// 将浮点值映射到原始整数域 `round(value / scale + zero_point)`。
  ///
  /// 结果不截断到 i8 范围，调用方可以直接与原始值比较。
  #[inline]
  pub fn quantize(&self, value: f32) -> i32 {
    (value / self.scale + self.zero_point as f32).round() as i32
  }
}

/// 形状的元素个数，乘积溢出时返回 `None`
pub fn element_count(shape: &[usize]) -> Option<usize> {
  shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// 只读的 int8 量化张量视图
///
/// 构造时一次性校验缩放系数与形状，之后的访问不再重复校验。
/// 缓冲区由推理运行时持有，视图只在一次推理调用内借用。
#[derive(Debug, Clone)]
pub struct QuantizedTensor<'a> {
  data: &'a [i8],
  params: QuantParams,
  shape: Box<[usize]>,
}

impl<'a> QuantizedTensor<'a> {
  pub fn new(data: &'a [i8], params: QuantParams, shape: &[usize]) -> Result<Self, QuantError> {
    // QuantParams 的字段是公开的，这里再校验一次
    let params = QuantParams::new(params.scale, params.zero_point)?;

    let expected =
      element_count(shape).ok_or_else(|| QuantError::ShapeOverflow(shape.to_vec()))?;
    if expected != data.len() {
      return Err(QuantError::ShapeMismatch {
        shape: shape.to_vec(),
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data,
      params,
      shape: shape.into(),
    })
  }

  /// 一维视图，形状即为 `[data.len()]`
  pub fn flat(data: &'a [i8], params: QuantParams) -> Result<Self, QuantError> {
    Self::new(data, params, &[data.len()])
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn params(&self) -> QuantParams {
    self.params
  }

  pub fn scale(&self) -> f32 {
    self.params.scale
  }

  pub fn zero_point(&self) -> i32 {
    self.params.zero_point
  }

  /// 原始数据切片，供已经校验过尺寸的热路径直接索引
  pub fn raw(&self) -> &'a [i8] {
    self.data
  }

  pub fn get(&self, index: usize) -> Result<i8, QuantError> {
    self
      .data
      .get(index)
      .copied()
      .ok_or(QuantError::IndexOutOfBounds {
        index,
        len: self.data.len(),
      })
  }

  #[inline]
  pub fn dequantize(&self, raw: i8) -> f32 {
    self.params.dequantize(raw)
  }

  pub fn dequantize_at(&self, index: usize) -> Result<f32, QuantError> {
    self.get(index).map(|raw| self.params.dequantize(raw))
  }
}
