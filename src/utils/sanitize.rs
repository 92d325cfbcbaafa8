//! 查询文本清洗
//!
//! 发送给后端之前去掉 HTML 标签、控制字符和行分隔符，
//! 并转义少量特殊字符，保证载荷内容可安全展示。

use regex::Regex;

/// 剔除控制字符
///
/// 用于查询清洗，也用于流式分片解析前的预处理：
/// 后端偶尔会把未转义的控制字节混进 JSON 字符串值里。
pub fn strip_control_chars(input: &str) -> String {
    match Regex::new(r"[\u{0000}-\u{001F}\u{007F}-\u{009F}]") {
        Ok(re) => re.replace_all(input, "").into_owned(),
        Err(_) => input.to_string(),
    }
}

/// 清洗查询文本
///
/// # 返回
/// 清洗并去除首尾空白后的文本
pub fn sanitize_query(query: &str) -> String {
    let mut text = query.to_string();

    if let Ok(re) = Regex::new(r"<[^>]*>") {
        text = re.replace_all(&text, "").into_owned();
    }
    text = strip_control_chars(&text);
    if let Ok(re) = Regex::new(r"[\u{2028}\u{2029}]") {
        text = re.replace_all(&text, " ").into_owned();
    }

    text.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '\'' => "&#39;".to_string(),
            '"' => "&quot;".to_string(),
            _ => c.to_string(),
        })
        .collect::<String>()
        .trim()
        .to_string()
}
