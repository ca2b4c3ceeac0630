// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/gate_equivalence.rs - 门控快速跳过不改变结果
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

mod common;

use common::{Head, Lcg};
use shanan_decode::detect::{DecodeConfig, decode_branch};

#[test]
fn gate_skips_only_cells_without_candidates() {
  let mut rng = Lcg::new(2026);
  let head = Head::random(16, 6, &mut rng);
  let gated = head.branch(8.0, true);
  let plain = head.branch(8.0, false);

  for step in 1..20 {
    let threshold = step as f32 * 0.05;
    let config = DecodeConfig::default()
      .with_num_classes(6)
      .with_conf_threshold(threshold);

    let mut with_gate = Vec::new();
    let gate_stats = decode_branch(0, &gated, &config, &mut with_gate).unwrap();
    let mut without_gate = Vec::new();
    let plain_stats = decode_branch(0, &plain, &config, &mut without_gate).unwrap();

    assert_eq!(with_gate, without_gate, "阈值 {}", threshold);
    assert_eq!(gate_stats.candidates, plain_stats.candidates);
    assert_eq!(plain_stats.gated, 0);
    assert_eq!(gate_stats.gated + gate_stats.class_scans, head.cells());
    assert!(gate_stats.class_scans <= plain_stats.class_scans);
  }
}

#[test]
fn disabled_gate_is_ignored() {
  let mut rng = Lcg::new(11);
  let head = Head::random(8, 3, &mut rng);
  let branch = head.branch(8.0, true);
  let config = DecodeConfig::default()
    .with_num_classes(3)
    .with_conf_threshold(0.7)
    .with_gate(false);

  let mut items = Vec::new();
  let stats = decode_branch(0, &branch, &config, &mut items).unwrap();
  assert_eq!(stats.gated, 0);
  assert_eq!(stats.class_scans, head.cells());
}
