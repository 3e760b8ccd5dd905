//! HTML 页面模板：错误页与目录索引页。
//!
//! 模板源文件位于 `static/`，在首次使用时经过一次简单压缩（去掉标点两侧的空白），
//! 之后每次渲染只做字符串拼接。

use std::time::SystemTime;

use lazy_static::lazy_static;
use regex::Regex;

use crate::{
    param::reason_phrase,
    util::{escape_html, format_file_size, format_listing_time},
};

lazy_static! {
    static ref MINIFY_AFTER: Regex = Regex::new(r"(\W)\s+").unwrap();
    static ref MINIFY_BEFORE: Regex = Regex::new(r"\s+(\W)").unwrap();
    static ref ERROR_RAW: String = minify(include_str!("../static/error.html"));
    static ref INDEX_HEAD: String = minify(include_str!("../static/index-0.html"));
    static ref INDEX_NAV: String = minify(include_str!("../static/index-1.html"));
    static ref INDEX_SCRIPT: String = minify(include_str!("../static/index-2.html"));
}

/// 目录列表中的一项
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub name: String,
    /// 文件大小（字节），目录为 0
    pub size: u64,
    pub modified: SystemTime,
    pub is_dir: bool,
}

fn minify(input: &str) -> String {
    let input = MINIFY_AFTER.replace_all(input, "$1");
    MINIFY_BEFORE.replace_all(&input, "$1").into_owned()
}

/// 生成错误页，标题为 `<状态码> <原因短语>`，正文为请求路径的面包屑导航。
pub fn error_page(code: u16, path: &str) -> Vec<u8> {
    let title = format!("{} {}", code, reason_phrase(code));
    let mut buff = ERROR_RAW.replace("TITLE", &title);
    html_path(&mut buff, path);
    buff.into_bytes()
}

/// 生成目录索引页。
///
/// 以 `.` 开头的条目被隐藏；目录排在文件之前，同类按名称排序。
/// 若存在 readme（`readme`、`readme.md`、`readme.txt`，不区分大小写），
/// 页面脚本会在浏览器端取回它的内容并显示在列表之后。
pub fn index(path: &str, entries: &[ListingEntry]) -> Vec<u8> {
    let mut entries: Vec<&ListingEntry> =
        entries.iter().filter(|e| !e.name.starts_with('.')).collect();
    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));

    let mut buff = String::with_capacity(INDEX_HEAD.len() + INDEX_SCRIPT.len() + 128 * entries.len());
    buff.push_str(&INDEX_HEAD);
    html_path(&mut buff, path);
    buff.push_str(&INDEX_NAV);

    let mut readme = None;
    for entry in entries {
        if entry.is_dir {
            buff.push_str("<br><div>-</div>");
        } else {
            let t = format_listing_time(entry.modified);
            buff.push_str(&format!(
                r#"<time datetime="{t}">{t}</time><div>{}</div>"#,
                format_file_size(entry.size)
            ));
        }

        let mut name = entry.name.clone();
        if entry.is_dir {
            name.push('/');
        }
        let escaped = escape_html(&name);
        if matches!(
            name.to_lowercase().as_str(),
            "readme" | "readme.md" | "readme.txt"
        ) {
            readme = Some(escaped.clone());
        }
        buff.push_str(&format!(r#"<a href="{escaped}">{escaped}</a>"#));
    }
    buff.push_str("</div>");

    if let Some(readme) = readme {
        buff.push_str("<pre id=r>");
        buff.push_str(&readme);
        buff.push_str("</pre>");
    }
    buff.push_str(&INDEX_SCRIPT);
    buff.into_bytes()
}

/// 把路径渲染成可点击的面包屑：每一级目录一个链接，最后的文件名链接到自身。
fn html_path(buff: &mut String, path: &str) {
    buff.push_str(r#"<div id=p><a href="/">/</a>"#);
    let mut splits: Vec<&str> = path.strip_prefix('/').unwrap_or(path).split('/').collect();
    let end = splits.pop().unwrap_or("");

    let mut all = String::from("/");
    for part in splits {
        let h = escape_html(part);
        all.push_str(&h);
        all.push('/');
        buff.push_str(&format!(r#"<a href="{all}">{h}/</a>"#));
    }
    if !end.is_empty() {
        buff.push_str(&format!(r#"<a href="">{}</a>"#, escape_html(end)));
    }
    buff.push_str("</div>");
}
