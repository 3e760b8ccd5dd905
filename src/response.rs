// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 响应构建模块
//!
//! `Response` 只负责报文的组装：状态行、按顺序保存的响应头和可选的响应体。
//! 响应头的语义（`Content-Length`、`ETag` 等）由各处理器决定，这里不会自动补齐，
//! 只有 `Date`、`Server` 与 `Connection` 在序列化时统一追加。

use bytes::Bytes;
use chrono::prelude::*;

use crate::{param::*, util::format_http_date};

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    headers: Vec<(String, String)>,
    date: DateTime<Utc>,
    content: Option<Bytes>,
    /// HEAD 请求：保留全部响应头，但不发送响应体
    head_only: bool,
    /// 反向代理转发的上游原始报文，序列化时原样输出
    raw: Option<Bytes>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            headers: Vec::new(),
            date: Utc::now(),
            content: None,
            head_only: false,
            raw: None,
        }
    }

    /// 以上游返回的原始报文构造响应，`status_code` 仅用于日志。
    pub fn raw(status_code: u16, bytes: Bytes) -> Self {
        let mut response = Self::new();
        response.set_code(status_code);
        response.raw = Some(bytes);
        response
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = reason_phrase(code).to_string();
        self
    }

    /// 追加一个响应头，不覆盖同名字段。名称与值中的 CR、LF 被替换为空格。
    pub fn add_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.push((single_line(name), single_line(value)));
        self
    }

    /// 设置响应头，覆盖已有的同名字段
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.add_header(name, value)
    }

    pub fn set_content(&mut self, content: Bytes) -> &mut Self {
        self.content = Some(content);
        self
    }

    pub fn set_head_only(&mut self, head_only: bool) -> &mut Self {
        self.head_only = head_only;
        self
    }

    /// 序列化为完整的 HTTP/1.1 报文
    pub fn as_bytes(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.to_vec();
        }

        let mut header = format!(
            "{} {} {}{}",
            self.version, self.status_code, self.information, CRLF
        );
        for (name, value) in &self.headers {
            header.push_str(name);
            header.push_str(": ");
            header.push_str(value);
            header.push_str(CRLF);
        }
        header.push_str(&["Date: ", &format_http_date(self.date), CRLF].concat());
        header.push_str(&["Server: ", SERVER_NAME, CRLF].concat());
        header.push_str(&["Connection: close", CRLF].concat());
        header.push_str(CRLF);

        let body: &[u8] = match (&self.content, self.head_only) {
            (Some(c), false) => &c[..],
            _ => b"",
        };
        [header.as_bytes(), body].concat()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    /// 按名称查找响应头，大小写不敏感
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// 实际会发送给客户端的响应体（HEAD 请求为空）
    pub fn body(&self) -> &[u8] {
        match (&self.content, self.head_only) {
            (Some(c), false) => &c[..],
            _ => b"",
        }
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
