//! 自定义断言辅助模块
//!
//! 提供测试中的常用断言函数

use std::collections::HashSet;

use crossquery::core::PipelineError;

/// 断言结果失败并匹配错误消息
pub fn assert_err_with<T: std::fmt::Debug, E: std::fmt::Display>(result: Result<T, E>, expected_msg: &str) {
    let err = result.expect_err("操作应该失败");
    let err_str = err.to_string();
    assert!(
        err_str.contains(expected_msg),
        "错误消息应包含 '{}', 实际是 '{}'",
        expected_msg,
        err_str
    );
}

/// 断言集合包含指定数量的元素
pub fn assert_count<T>(collection: &[T], expected: usize, item_name: &str) {
    assert_eq!(
        collection.len(),
        expected,
        "{}数量不匹配: 期望 {}, 实际 {}",
        item_name,
        expected,
        collection.len()
    );
}

/// 断言没有重复的 id
pub fn assert_no_duplicates(ids: &[String]) {
    let mut seen = HashSet::new();
    for id in ids {
        assert!(seen.insert(id), "结果中出现重复的文档 '{}'", id);
    }
}

/// 断言错误要求调用方丢弃续传令牌重新执行
pub fn assert_requires_restart<T: std::fmt::Debug>(result: Result<T, PipelineError>) {
    let err = result.expect_err("操作应该失败");
    assert!(err.requires_restart(), "错误应要求重新执行, 实际是 '{}'", err);
}

/// 断言两次浮点累计值相等
pub fn assert_charge_eq(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "费用不匹配: 期望 {}, 实际 {}",
        expected,
        actual
    );
}
