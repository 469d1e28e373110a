//! 短文本相似度 (0-100)
//!
//! 批量匹配和预览接口共用这一个实现。

use strsim::levenshtein;

/// 包含关系的固定得分
const CONTAINMENT_SCORE: u8 = 85;
/// 词级得分上限
const WORD_SCORE_CAP: f64 = 90.0;
/// 参与词级比较的最短 token 长度
const MIN_TOKEN_LEN: usize = 3;

/// 两个短字段的相似度，结果在 [0, 100] 且与参数顺序无关
///
/// - 都为空 -> 100；只有一个为空 -> 0
/// - 归一化后相等 -> 100；互相包含 -> 85
/// - 否则取字符级与词级得分的较大值
pub fn similarity(a: &str, b: &str) -> u8 {
    let a = normalize(a);
    let b = normalize(b);

    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 100,
        (true, false) | (false, true) => return 0,
        (false, false) => {}
    }

    if a == b {
        return 100;
    }
    if a.contains(b.as_str()) || b.contains(a.as_str()) {
        return CONTAINMENT_SCORE;
    }

    char_score(&a, &b).max(word_score(&a, &b))
}

pub(crate) fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// 按非字母数字切分，丢弃长度 <= 2 的 token
pub(crate) fn tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TOKEN_LEN)
        .collect()
}

/// 100 * (maxLen - levenshtein) / maxLen
fn char_score(a: &str, b: &str) -> u8 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 100;
    }
    let distance = levenshtein(a, b).min(max_len);
    let score = 100.0 * (max_len - distance) as f64 / max_len as f64;
    score.round() as u8
}

/// 相同 token 记 2 分，互相包含记 1 分，按较多一方的 token 数归一化
fn word_score(a: &str, b: &str) -> u8 {
    let tokens_a = tokens(a);
    let tokens_b = tokens(b);
    let max_words = tokens_a.len().max(tokens_b.len());
    if max_words == 0 {
        return 0;
    }

    let mut points = 0usize;
    for ta in &tokens_a {
        for tb in &tokens_b {
            if ta == tb {
                points += 2;
            } else if ta.contains(tb) || tb.contains(ta) {
                points += 1;
            }
        }
    }

    let score = (50.0 * points as f64 / max_words as f64).min(WORD_SCORE_CAP);
    score.round() as u8
}
