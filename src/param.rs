// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块集中定义 `servhttp` 使用的 HTTP 协议相关常量和数据结构：
//! - 状态码及其原因短语（Reason Phrase）。
//! - 扩展名到 MIME 类型的映射表。
//! - HTTP 方法与版本的强类型枚举。
//! - 各处理器共享的响应头名称与编码标识。

use std::{collections::HashMap, fmt, time::Duration};

use lazy_static::lazy_static;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "servhttp";

/// HTTP 协议规定的换行符
pub const CRLF: &str = "\r\n";

/// 目录页面与错误页面使用的媒体类型
pub const HTML_MIME: &str = "text/html; charset=utf-8";

/// 缓存处理器支持的唯一压缩编码
pub const DEFLATE_ENCODING: &str = "deflate";

/// 目录的索引文件名
pub const INDEX_FILE: &str = "index.html";

/// 缓存处理器的刷新周期
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(20);

/// 请求头（含请求行）允许的最大字节数
pub const MAX_HEADER_SIZE: usize = 16 * 1024;

/// 请求体允许的最大字节数（仅反向代理会转发请求体）
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// 读取客户端请求的超时时间
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// 反向代理连接上游的超时时间
pub const PROXY_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 反向代理等待上游完整响应的超时时间
pub const PROXY_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

pub const HEADER_ACCEPT_ENCODING: &str = "Accept-Encoding";
pub const HEADER_CACHE_CONTROL: &str = "Cache-Control";
pub const HEADER_CONTENT_ENCODING: &str = "Content-Encoding";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
pub const HEADER_ETAG: &str = "ETag";
pub const HEADER_IF_MODIFIED_SINCE: &str = "If-Modified-Since";
pub const HEADER_IF_NONE_MATCH: &str = "If-None-Match";
pub const HEADER_LAST_MODIFIED: &str = "Last-Modified";
pub const HEADER_LOCATION: &str = "Location";

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        map.insert(200, "OK");
        map.insert(204, "No Content");
        map.insert(206, "Partial Content");

        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");

        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(408, "Request Timeout");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");
        map.insert(431, "Request Header Fields Too Large");

        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(502, "Bad Gateway");
        map.insert(503, "Service Unavailable");
        map.insert(504, "Gateway Timeout");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

lazy_static! {
    /// 文件扩展名（小写，不含点）到 MIME 类型的映射表。
    static ref MIME_TYPES: HashMap<&'static str, &'static str> = {
        let mut map = HashMap::new();
        map.insert("avif", "image/avif");
        map.insert("bmp", "image/bmp");
        map.insert("css", "text/css; charset=utf-8");
        map.insert("csv", "text/csv; charset=utf-8");
        map.insert("gif", "image/gif");
        map.insert("gz", "application/gzip");
        map.insert("htm", "text/html; charset=utf-8");
        map.insert("html", "text/html; charset=utf-8");
        map.insert("ico", "image/vnd.microsoft.icon");
        map.insert("jpeg", "image/jpeg");
        map.insert("jpg", "image/jpeg");
        map.insert("js", "text/javascript; charset=utf-8");
        map.insert("json", "application/json");
        map.insert("md", "text/markdown; charset=utf-8");
        map.insert("mjs", "text/javascript; charset=utf-8");
        map.insert("mp3", "audio/mpeg");
        map.insert("mp4", "video/mp4");
        map.insert("oga", "audio/ogg");
        map.insert("ogv", "video/ogg");
        map.insert("otf", "font/otf");
        map.insert("pdf", "application/pdf");
        map.insert("png", "image/png");
        map.insert("svg", "image/svg+xml");
        map.insert("tar", "application/x-tar");
        map.insert("ttf", "font/ttf");
        map.insert("txt", "text/plain; charset=utf-8");
        map.insert("wasm", "application/wasm");
        map.insert("wav", "audio/wav");
        map.insert("webm", "video/webm");
        map.insert("webmanifest", "application/manifest+json");
        map.insert("webp", "image/webp");
        map.insert("woff", "font/woff");
        map.insert("woff2", "font/woff2");
        map.insert("xml", "text/xml; charset=utf-8");
        map.insert("zip", "application/zip");
        map
    };
}

/// 根据文件名的扩展名解析 MIME 类型，无法识别时返回空字符串。
pub fn mime_by_name(name: &str) -> &'static str {
    let extension = match name.rsplit_once('.') {
        Some((_, e)) if !e.is_empty() && !e.contains('/') => e.to_ascii_lowercase(),
        _ => return "",
    };
    MIME_TYPES.get(extension.as_str()).copied().unwrap_or("")
}

/// 状态码对应的原因短语，未收录的状态码返回空字符串。
pub fn reason_phrase(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or("")
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpVersion {
    V1_0,
    V1_1,
}

/// HTTP 请求方法。
///
/// 解析器接受任意方法名，是否允许由处理器自行决定（缓存与文件处理器只放行 GET/HEAD）。
#[derive(Debug, Clone, PartialEq)]
pub enum HttpRequestMethod {
    Get,
    Head,
    Options,
    Post,
    Put,
    Delete,
    Patch,
    /// 其他方法，保留原始（大写）名称
    Other(String),
}

impl HttpRequestMethod {
    pub fn from_token(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            "PUT" => HttpRequestMethod::Put,
            "DELETE" => HttpRequestMethod::Delete,
            "PATCH" => HttpRequestMethod::Patch,
            other => HttpRequestMethod::Other(other.to_string()),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Put => write!(f, "PUT"),
            HttpRequestMethod::Delete => write!(f, "DELETE"),
            HttpRequestMethod::Patch => write!(f, "PATCH"),
            HttpRequestMethod::Other(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_by_name() {
        assert_eq!(mime_by_name("hello.txt"), "text/plain; charset=utf-8");
        assert_eq!(mime_by_name("index.HTML"), "text/html; charset=utf-8");
        assert_eq!(mime_by_name("archive.tar.gz"), "application/gzip");
    }

    #[test]
    fn test_mime_unknown_is_empty() {
        assert_eq!(mime_by_name("README"), "");
        assert_eq!(mime_by_name("data.unknown_extension"), "");
        assert_eq!(mime_by_name("trailing."), "");
    }

    #[test]
    fn test_method_from_token() {
        assert_eq!(HttpRequestMethod::from_token("get"), HttpRequestMethod::Get);
        assert_eq!(HttpRequestMethod::from_token("HEAD"), HttpRequestMethod::Head);
        assert_eq!(
            HttpRequestMethod::from_token("brew"),
            HttpRequestMethod::Other("BREW".to_string())
        );
        assert_eq!(HttpRequestMethod::from_token("brew").to_string(), "BREW");
    }

    #[test]
    fn test_reason_phrase() {
        assert_eq!(reason_phrase(308), "Permanent Redirect");
        assert_eq!(reason_phrase(999), "");
    }
}
