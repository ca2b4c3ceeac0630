// 该文件是 Shanan （山南西风） 项目的一部分。
// src/detect/dfl.rs - DFL（分布焦点损失）边框回归解码
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

/// softmax 分母保护值
pub const SOFTMAX_EPSILON: f32 = 1e-9;

/// 数值稳定的 softmax，概率写入 `probs`
///
/// 先减去最大值再求指数，分母加上 `SOFTMAX_EPSILON`。
pub fn softmax(logits: &[f32], probs: &mut Vec<f32>) {
  probs.clear();
  if logits.is_empty() {
    return;
  }

  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  probs.extend(logits.iter().map(|&v| (v - max).exp()));

  let denom = probs.iter().sum::<f32>() + SOFTMAX_EPSILON;
  probs.iter_mut().for_each(|p| *p /= denom);
}

/// 对一组已反量化的 DFL logits 求期望距离 `Σ softmax_i * i`
///
/// `scratch` 存放概率，调用方在整个分支内复用以避免重复分配。
pub fn dfl_distance(logits: &[f32], scratch: &mut Vec<f32>) -> f32 {
  softmax(logits, scratch);
  scratch
    .iter()
    .enumerate()
    .map(|(i, &p)| p * i as f32)
    .sum()
}
