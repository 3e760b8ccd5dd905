use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// 写回 `Location` 时需要转义的字符：控制字符（含 CR/LF）、空白与 URL 分隔符
const PATH_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// 以 RFC 1123（IMF-fixdate）格式输出时间，例如 `Wed, 21 Oct 2015 07:28:00 GMT`
pub fn format_http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

pub fn http_date(time: SystemTime) -> String {
    format_http_date(time.into())
}

/// 解析 `If-Modified-Since` 一类的 HTTP 日期，格式不合法时返回 `None`
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|d| SystemTime::from(d.with_timezone(&Utc)))
}

/// 目录列表中使用的 ISO-8601 UTC 时间，例如 `2023-12-02T12:23:25Z`
pub fn format_listing_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 按千位分组输出字节数，例如 `123 456 B`
pub fn format_file_size(size: u64) -> String {
    let digits = size.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out.push_str(" B");
    out
}

/// 转义 HTML 特殊字符，用于把文件名和路径写入页面
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            c => out.push(c),
        }
    }
    out
}

/// 把解码后的路径重新编码为可以放入响应头的 URL 路径，`/` 保持不变
pub fn escape_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_ESCAPE).to_string()
}

/// 规范化请求路径：折叠 `.` 与 `..`，去掉首尾的 `/`。
///
/// 根路径规范化为空字符串，`..` 不会越过根目录。
pub fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}
