//! 反向代理处理器。
//!
//! 每个请求新建一条到上游的 HTTP/1.1 连接，请求以 `Connection: close` 发出，
//! 上游返回的完整报文原样转发给客户端。

use std::{io, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use log::error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use crate::{
    common::{html_response, log_request, log_request_err, NotFoundHandler},
    handler::Handler,
    param::*,
    request::Request,
    response::Response,
    template,
};

/// 逐跳头部与客户端自带的转发头部，不发往上游
const DROPPED_HEADERS: [&str; 11] = [
    "Host",
    "Connection",
    "Keep-Alive",
    "Proxy-Connection",
    "TE",
    "Trailer",
    "Transfer-Encoding",
    "Upgrade",
    "X-Forwarded-For",
    "X-Forwarded-Host",
    "X-Forwarded-Proto",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ReverseProxyHandler {
    /// 发给上游的 `Host`
    authority: String,
    /// 连接地址，总是带端口
    address: String,
    /// 目标地址的路径前缀
    base_path: String,
    base_query: String,
}

impl ReverseProxyHandler {
    /// 解析形如 `http://host[:port][/base][?query]` 的目标地址
    pub fn parse(url: &str) -> Result<Self, String> {
        let rest = url
            .strip_prefix("http://")
            .ok_or_else(|| format!("unsupported scheme in {:?}", url))?;
        let (authority, target) = match rest.find(|c: char| c == '/' || c == '?') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, ""),
        };
        if authority.is_empty() || authority.contains(char::is_whitespace) {
            return Err(format!("invalid host in {:?}", url));
        }
        let (base_path, base_query) = target.split_once('?').unwrap_or((target, ""));

        let has_port = authority
            .rsplit_once(':')
            .map_or(false, |(_, p)| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
        let address = if has_port {
            authority.to_string()
        } else {
            format!("{}:80", authority)
        };

        Ok(Self {
            authority: authority.to_string(),
            address,
            base_path: base_path.to_string(),
            base_query: base_query.to_string(),
        })
    }

    /// 目标地址无法解析时记录错误，并返回一个总是 404 的处理器
    pub fn create(url: &str) -> Arc<dyn Handler> {
        match Self::parse(url) {
            Ok(handler) => Arc::new(handler),
            Err(e) => {
                error!("reverse-parse-url url={:?} err={:?}", url, e);
                Arc::new(NotFoundHandler)
            }
        }
    }

    /// 发往上游的请求目标：路径前缀与请求路径以单个 `/` 连接，查询串以 `&` 合并
    fn target(&self, request: &Request) -> String {
        let path = request.raw_path();
        let mut target = match (self.base_path.ends_with('/'), path.starts_with('/')) {
            (true, true) => format!("{}{}", self.base_path, &path[1..]),
            (false, false) => format!("{}/{}", self.base_path, path),
            _ => format!("{}{}", self.base_path, path),
        };
        match (self.base_query.is_empty(), request.query().is_empty()) {
            (true, true) => {}
            (false, true) => target = format!("{}?{}", target, self.base_query),
            (true, false) => target = format!("{}?{}", target, request.query()),
            (false, false) => {
                target = format!("{}?{}&{}", target, self.base_query, request.query())
            }
        }
        target
    }

    fn upstream_request(&self, request: &Request) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1{}Host: {}{}",
            request.method(),
            self.target(request),
            CRLF,
            self.authority,
            CRLF
        );
        for (name, value) in request.headers() {
            if DROPPED_HEADERS.iter().any(|d| d.eq_ignore_ascii_case(name)) {
                continue;
            }
            head.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        head.push_str(&format!(
            "X-Forwarded-For: {}{}",
            client_ip(request.remote_addr()),
            CRLF
        ));
        head.push_str(&format!("X-Forwarded-Host: {}{}", request.host(), CRLF));
        head.push_str(&format!("X-Forwarded-Proto: http{}", CRLF));
        head.push_str(&format!("Connection: close{}{}", CRLF, CRLF));

        [head.as_bytes(), request.body().as_ref()].concat()
    }

    async fn forward(&self, request: &Request) -> io::Result<(u16, Bytes)> {
        let mut stream = timeout(PROXY_CONNECT_TIMEOUT, TcpStream::connect(&self.address))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timeout"))??;
        stream.write_all(&self.upstream_request(request)).await?;

        let mut buffer = Vec::new();
        timeout(PROXY_RESPONSE_TIMEOUT, stream.read_to_end(&mut buffer))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "response timeout"))??;

        let status = parse_status(&buffer).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "malformed upstream response")
        })?;
        Ok((status, Bytes::from(buffer)))
    }
}

#[async_trait]
impl Handler for ReverseProxyHandler {
    async fn serve(&self, request: &Request) -> Response {
        match self.forward(request).await {
            Ok((status, raw)) => {
                log_request(status, request);
                Response::raw(status, raw)
            }
            Err(e) => {
                log_request_err(502, request, &e);
                let mut response = Response::new();
                response.set_head_only(request.is_head());
                html_response(response, 502, template::error_page(502, request.path()))
            }
        }
    }
}

/// 去掉端口与 IPv6 方括号
fn client_ip(remote_addr: &str) -> &str {
    let host = match remote_addr.rsplit_once(':') {
        Some((host, port)) if port.bytes().all(|b| b.is_ascii_digit()) => host,
        _ => remote_addr,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

/// 从状态行 `HTTP/1.1 200 OK` 中取出状态码
fn parse_status(buffer: &[u8]) -> Option<u16> {
    let end = buffer.windows(2).position(|w| w == b"\r\n")?;
    let line = std::str::from_utf8(&buffer[..end]).ok()?;
    let mut parts = line.split(' ');
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}
