//! 工具函数模块
//!
//! 提供微秒时间转换、单聊会话键生成、瞬时故障重试等通用工具函数

pub mod retry;

pub use retry::{RetryPolicy, retry_transient};

#[cfg(test)]
mod pair_key_tests;

use chrono::{DateTime, TimeZone, Utc};

/// 单聊会话键中两个用户 ID 的分隔符
pub const PAIR_KEY_SEPARATOR: char = '_';

/// 微秒数转换为 DateTime
pub fn micros_to_datetime(us: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_micros(us).single()
}

/// 对用户 ID 中的 `%` 和分隔符做百分号转义，保证拼接结果可逆
fn escape_pair_component(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for ch in id.chars() {
        match ch {
            '%' => out.push_str("%25"),
            PAIR_KEY_SEPARATOR => out.push_str("%5F"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_pair_component(component: &str) -> Option<String> {
    let mut out = String::with_capacity(component.len());
    let mut chars = component.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let code: String = chars.by_ref().take(2).collect();
        match code.as_str() {
            "25" => out.push('%'),
            "5F" => out.push(PAIR_KEY_SEPARATOR),
            _ => return None,
        }
    }
    Some(out)
}

/// 生成单聊会话 ID：两个用户 ID 排序后拼接
///
/// 与参数顺序无关，`direct_pair_key(a, b) == direct_pair_key(b, a)`。
pub fn direct_pair_key(user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_a <= user_b {
        (user_a, user_b)
    } else {
        (user_b, user_a)
    };
    format!(
        "{}{}{}",
        escape_pair_component(first),
        PAIR_KEY_SEPARATOR,
        escape_pair_component(second)
    )
}

/// 解析单聊会话 ID，返回排序后的两个用户 ID
///
/// 旧版本客户端生成的随机 ID 无法解析，返回 None。
pub fn parse_direct_pair_key(key: &str) -> Option<(String, String)> {
    let mut parts = key.split(PAIR_KEY_SEPARATOR);
    let first = unescape_pair_component(parts.next()?)?;
    let second = unescape_pair_component(parts.next()?)?;
    if parts.next().is_some() || first.is_empty() || second.is_empty() || first > second {
        return None;
    }
    Some((first, second))
}
