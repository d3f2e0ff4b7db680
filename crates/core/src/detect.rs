//! 身份号码候选检测
//!
//! 两种独立策略扫描同一 token 流，各自都可能命中：
//! - 策略 A：整 token 匹配，适配引擎把整个号码当一个短语返回的情况
//! - 策略 B：连续纯数字 token 聚合，适配号码被拆成分散数字组的情况
//!
//! 同一个物理号码可能被两种策略同时命中，下游不去重：
//! 同一区域涂黑两次无副作用。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::token::Token;

/// 候选来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// 策略 A：单 token 内的完整号码
    WholeToken,
    /// 策略 B：连续数字 token 聚合出的号码
    GroupRun,
    /// 先知给出号码后在 token 流中找回的位置
    Oracle,
}

/// 一次号码命中
///
/// `value` 去掉空白后恰为 12 位数字；`span` 为贡献 token 的下标，
/// 保持流内顺序。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierMatch {
    pub value: String,
    pub span: Vec<usize>,
    pub kind: MatchKind,
}

// token 开头的 12 位连续数字
static COMPACT_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{12}\b").unwrap());
// token 开头的 4-4-4 分组形式
static SPACED_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4} \d{4} \d{4}").unwrap());
// 聚合缓冲的整体匹配，必须全量命中，防止更长数字串里的偶然片段
static GROUPED_FULL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4} \d{4} \d{4}$").unwrap());

/// 两种策略合并扫描
pub fn detect(tokens: &[Token]) -> Vec<IdentifierMatch> {
    let mut matches = detect_whole_tokens(tokens);
    matches.extend(detect_group_runs(tokens));
    matches
}

/// 策略 A：整 token 匹配
///
/// token 文本以 12 位连续数字或 4-4-4 分组开头即命中，号码取
/// 匹配到的部分（token 可能带有数字之外的尾缀）。
pub fn detect_whole_tokens(tokens: &[Token]) -> Vec<IdentifierMatch> {
    let mut matches = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        let hit = COMPACT_PATTERN
            .find(&token.text)
            .or_else(|| SPACED_PATTERN.find(&token.text));
        if let Some(m) = hit {
            matches.push(IdentifierMatch {
                value: m.as_str().to_string(),
                span: vec![idx],
                kind: MatchKind::WholeToken,
            });
        }
    }

    matches
}

/// 策略 B：连续数字 token 聚合
///
/// 维护一段连续纯数字 token 的缓冲；遇到非数字或空 token 即冲刷：
/// 缓冲文本以单空格拼接后整体匹配 4-4-4。命中时 span 只保留前两个
/// 缓冲 token（遮盖前 8 位已足够）。无论是否命中，冲刷后缓冲清空。
/// 流结尾残留的缓冲不冲刷。
pub fn detect_group_runs(tokens: &[Token]) -> Vec<IdentifierMatch> {
    let mut matches = Vec::new();
    let mut buffer: Vec<usize> = Vec::new();

    for (idx, token) in tokens.iter().enumerate() {
        let text = token.text.trim();
        if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
            buffer.push(idx);
        } else {
            flush_buffer(&mut buffer, tokens, &mut matches);
        }
    }

    matches
}

fn flush_buffer(buffer: &mut Vec<usize>, tokens: &[Token], out: &mut Vec<IdentifierMatch>) {
    if !buffer.is_empty() {
        let joined = buffer
            .iter()
            .map(|i| tokens[*i].text.trim())
            .collect::<Vec<_>>()
            .join(" ");
        if GROUPED_FULL_PATTERN.is_match(&joined) {
            out.push(IdentifierMatch {
                value: joined,
                span: buffer.iter().take(2).copied().collect(),
                kind: MatchKind::GroupRun,
            });
        }
    }
    buffer.clear();
}

/// 在 token 流中为已知号码找回几何位置（先知辅助路径）
///
/// 先找数字内容包含完整号码的单 token；找不到时退而找与号码前两个
/// 4 位分组逐一相等的 token。两步都失败返回 None：号码确认存在
/// 但定位失败，由调用方作为独立结果上报，绝不臆造区域。
pub fn locate_value(value: &str, tokens: &[Token]) -> Option<IdentifierMatch> {
    let needle = digits_of(value);
    if needle.len() != 12 {
        return None;
    }

    // 单 token 内含完整号码
    for (idx, token) in tokens.iter().enumerate() {
        if digits_of(&token.text).contains(&needle) {
            return Some(IdentifierMatch {
                value: value.to_string(),
                span: vec![idx],
                kind: MatchKind::Oracle,
            });
        }
    }

    // 前两个 4 位分组各自独立成 token 的情况
    let groups = [&needle[0..4], &needle[4..8]];
    let span: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| {
            let digits = digits_of(&t.text);
            groups.iter().any(|g| digits == **g)
        })
        .map(|(idx, _)| idx)
        .collect();

    if span.is_empty() {
        None
    } else {
        Some(IdentifierMatch {
            value: value.to_string(),
            span,
            kind: MatchKind::Oracle,
        })
    }
}

/// 去掉空白与标点，只留数字
fn digits_of(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Rect;

    fn token(text: &str) -> Token {
        Token {
            text: text.to_string(),
            rect: Rect::new(0, 0, 10, 10),
            confidence: Some(80),
        }
    }

    fn stream(texts: &[&str]) -> Vec<Token> {
        texts.iter().map(|t| token(t)).collect()
    }

    #[test]
    fn test_whole_token_compact_form() {
        let tokens = stream(&["Name:", "123456789012", "DOB"]);
        let matches = detect_whole_tokens(&tokens);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, "123456789012");
        assert_eq!(matches[0].span, vec![1]);
        assert_eq!(matches[0].kind, MatchKind::WholeToken);
    }

    #[test]
    fn test_whole_token_spaced_form() {
        let tokens = stream(&["1234 5678 9012"]);
        let matches = detect_whole_tokens(&tokens);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, "1234 5678 9012");
        // 去空白后恰为 12 位数字
        let compact: String = matches[0].value.chars().filter(|c| !c.is_whitespace()).collect();
        assert_eq!(compact.len(), 12);
        assert!(compact.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_whole_token_value_excludes_trailing_noise() {
        // token 尾部混入噪声字符时，号码只取匹配到的前缀
        let tokens = stream(&["123456789012:"]);
        let matches = detect_whole_tokens(&tokens);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, "123456789012");
    }

    #[test]
    fn test_whole_token_rejects_short_and_long_runs() {
        let tokens = stream(&["12345678901", "1234567890123", "abc123"]);
        // 11 位不够；13 位连续数字因缺少词边界也不命中
        assert!(detect_whole_tokens(&tokens).is_empty());
    }

    #[test]
    fn test_group_run_three_groups() {
        let tokens = stream(&["UID", "1234", "5678", "9012", "male"]);
        let matches = detect_group_runs(&tokens);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].value, "1234 5678 9012");
        // 只保留前两个分组 token 的几何
        assert_eq!(matches[0].span, vec![1, 2]);
        assert_eq!(matches[0].kind, MatchKind::GroupRun);
    }

    #[test]
    fn test_group_run_rejects_two_groups() {
        let tokens = stream(&["1234", "5678", "end"]);
        assert!(detect_group_runs(&tokens).is_empty());
    }

    #[test]
    fn test_group_run_rejects_four_groups() {
        // 全量匹配约束：更长的数字串不允许命中其中的片段
        let tokens = stream(&["1234", "5678", "9012", "3456", "end"]);
        assert!(detect_group_runs(&tokens).is_empty());
    }

    #[test]
    fn test_group_run_buffer_resets_between_runs() {
        let tokens = stream(&["99", "x", "1234", "5678", "9012", "x"]);
        let matches = detect_group_runs(&tokens);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].span, vec![2, 3]);
    }

    #[test]
    fn test_group_run_trailing_buffer_not_flushed() {
        // 流在数字 token 上结束时不冲刷缓冲（保持原有行为）
        let tokens = stream(&["UID", "1234", "5678", "9012"]);
        assert!(detect_group_runs(&tokens).is_empty());
    }

    #[test]
    fn test_both_strategies_may_fire() {
        let tokens = stream(&["1234 5678 9012", "x", "1234", "5678", "9012", "y"]);
        let matches = detect(&tokens);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].kind, MatchKind::WholeToken);
        assert_eq!(matches[1].kind, MatchKind::GroupRun);
    }

    #[test]
    fn test_locate_value_single_token() {
        let tokens = stream(&["Name", "1234 5678 9012", "male"]);
        let m = locate_value("1234 5678 9012", &tokens).unwrap();
        assert_eq!(m.span, vec![1]);
        assert_eq!(m.kind, MatchKind::Oracle);
    }

    #[test]
    fn test_locate_value_group_tokens() {
        let tokens = stream(&["1234", "5678", "9012"]);
        let m = locate_value("1234 5678 9012", &tokens).unwrap();
        // 前两个分组命中即可定位
        assert_eq!(m.span, vec![0, 1]);
    }

    #[test]
    fn test_locate_value_not_found() {
        let tokens = stream(&["Name", "DOB", "9999"]);
        assert!(locate_value("1234 5678 9012", &tokens).is_none());
    }

    #[test]
    fn test_locate_value_rejects_malformed_value() {
        let tokens = stream(&["1234 5678 9012"]);
        assert!(locate_value("1234 5678", &tokens).is_none());
    }
}
