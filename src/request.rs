// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体：
//! 1. 请求行（方法、请求目标、版本）的解析，请求目标拆分为解码后的路径与原始查询串。
//! 2. 请求头按原始顺序保存，查询时大小写不敏感。
//! 3. 按 `Content-Length` 截取请求体（只有反向代理会使用）。

use bytes::Bytes;
use log::error;
use percent_encoding::percent_decode_str;

use crate::{exception::Exception, param::*};

/// 一个完整的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct Request {
    method: HttpRequestMethod,
    /// 百分号解码后的路径，例如 `/a b/`
    path: String,
    /// 请求目标中未经解码的路径部分，转发给上游时使用
    raw_path: String,
    /// 不含 `?` 的原始查询串
    query: String,
    version: HttpVersion,
    host: String,
    headers: Vec<(String, String)>,
    remote_addr: String,
    body: Bytes,
}

/// 在缓冲区中查找请求头结束位置，返回请求体起始下标。
pub fn head_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|p| p + 4)
}

impl Request {
    /// 从原始字节缓冲区构建 `Request`。
    ///
    /// `buffer` 必须包含完整的请求头；请求头之后的字节被视为请求体，
    /// 并按 `Content-Length` 截断。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let body_start = head_end(buffer).unwrap_or(buffer.len());
        let head = match std::str::from_utf8(&buffer[..body_start]) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut lines = head.split(CRLF);
        let request_line = lines.next().unwrap_or("");
        let parts: Vec<&str> = request_line.split(' ').filter(|p| !p.is_empty()).collect();
        if parts.len() != 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            return Err(Exception::MalformedRequest);
        }

        let method = HttpRequestMethod::from_token(parts[0]);
        let version = match parts[2].to_ascii_uppercase().as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            other => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, other);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            match line.split_once(':') {
                Some((name, value)) => {
                    headers.push((name.trim().to_string(), value.trim().to_string()))
                }
                None => {
                    error!("[ID{}]无法解析的请求头：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            }
        }

        let mut host = find_header(&headers, "Host").unwrap_or("").to_string();

        // 绝对形式的请求目标：http://host/path?query
        let mut target = parts[1];
        for scheme in ["http://", "https://"] {
            if let Some(rest) = target.strip_prefix(scheme) {
                let (authority, path) = match rest.find('/') {
                    Some(i) => (&rest[..i], &rest[i..]),
                    None => (rest, "/"),
                };
                if host.is_empty() {
                    host = authority.to_string();
                }
                target = path;
            }
        }
        let (raw_path, query) = match target.split_once('?') {
            Some((p, q)) => (p, q),
            None => (target, ""),
        };
        let path = percent_decode_str(raw_path).decode_utf8_lossy().into_owned();

        let content_length = find_header(&headers, HEADER_CONTENT_LENGTH)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let rest = &buffer[body_start..];
        let body = Bytes::copy_from_slice(&rest[..content_length.min(rest.len())]);

        Ok(Self {
            method,
            path,
            raw_path: raw_path.to_string(),
            query: query.to_string(),
            version,
            host,
            headers,
            remote_addr: String::new(),
            body,
        })
    }

    /// 记录客户端地址（由连接层在解析后填入）
    pub fn with_remote_addr(mut self, remote_addr: &str) -> Self {
        self.remote_addr = remote_addr.to_string();
        self
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

impl Request {
    pub fn method(&self) -> &HttpRequestMethod {
        &self.method
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 解码后的请求路径（不含查询串）
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn raw_path(&self) -> &str {
        &self.raw_path
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// 按名称查找请求头，大小写不敏感
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_head(&self) -> bool {
        self.method == HttpRequestMethod::Head
    }

    /// 在路径后附加原始查询串（如果有）
    pub fn with_query(&self, path: &str) -> String {
        if self.query.is_empty() {
            path.to_string()
        } else {
            format!("{}?{}", path, self.query)
        }
    }
}
