use bigdecimal::BigDecimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::str::FromStr;

/// 解析金额文本，无法识别时返回 None
///
/// 允许千分位逗号、空格和常见货币符号，例如 `"$ 12,500.00"`。
pub fn parse_amount(raw: &str) -> Option<BigDecimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '_' | '$' | '€' | '£' | '¥'))
        .collect();

    if cleaned.is_empty() {
        return None;
    }
    BigDecimal::from_str(&cleaned).ok()
}

/// 宽松的金额反序列化：数字或数字字符串 -> Some，其余（null、非数字文本、对象）-> None
///
/// 提取结果中的金额经常是 `"n/a"`、`""` 之类的脏数据，这里不报错。
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<BigDecimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => BigDecimal::from_str(&n.to_string()).ok(),
        Some(Value::String(s)) => parse_amount(&s),
        _ => None,
    })
}
