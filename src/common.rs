//! 文件类处理器共享的请求规则。
//!
//! 缓存处理器与文件处理器在解析资源之前都要执行同一套规则：
//! 附加 `Cache-Control`、拒绝 GET/HEAD 以外的方法、把 `.../index.html` 重定向到目录，
//! 以及目录与文件的尾部斜杠规范化。每个处理器组合一个 `Common` 来复用这些规则。

use std::fmt::Display;

use async_trait::async_trait;
use bytes::Bytes;
use log::{info, warn};

use crate::{
    handler::Handler,
    param::*,
    request::Request,
    response::Response,
    template,
    util::escape_path,
};

#[derive(Debug, Clone, Default)]
pub struct Common {
    /// 为空时不添加 `Cache-Control`
    cache_control: String,
}

impl Common {
    pub fn new(cache_control: &str) -> Self {
        Self {
            cache_control: cache_control.to_string(),
        }
    }

    pub fn cache_control(&self) -> &str {
        &self.cache_control
    }

    /// 创建带有 `Cache-Control` 的基础响应；HEAD 请求只发送响应头。
    pub fn response(&self, request: &Request) -> Response {
        let mut response = Response::new();
        if !self.cache_control.is_empty() {
            response.add_header(HEADER_CACHE_CONTROL, &self.cache_control);
        }
        response.set_head_only(request.is_head());
        response
    }

    /// 执行方法过滤与 `index.html` 重定向。
    ///
    /// 返回 `Some` 表示请求已经处理完毕，调用方应直接返回该响应。
    pub fn filter(&self, request: &Request) -> Option<Response> {
        match request.method() {
            HttpRequestMethod::Get | HttpRequestMethod::Head => {}
            _ => {
                log_request(405, request);
                return Some(html_response(
                    self.response(request),
                    405,
                    template::error_page(405, request.path()),
                ));
            }
        }

        if let Some(dir) = request.path().strip_suffix(INDEX_FILE) {
            if dir.ends_with('/') {
                log_request(308, request);
                return Some(redirect(
                    self.response(request),
                    308,
                    &request.with_query(&escape_path(dir)),
                ));
            }
        }
        None
    }

    /// 目录必须以 `/` 结尾，文件不能以 `/` 结尾，否则 301 重定向到规范路径。
    pub fn end_slash(&self, request: &Request, is_dir: bool) -> Option<Response> {
        let path = request.path();
        let end_slash = path.ends_with('/');
        if is_dir == end_slash {
            return None;
        }

        let location = if end_slash {
            path.trim_end_matches('/').to_string()
        } else {
            format!("{}/", path)
        };
        log_request(301, request);
        Some(redirect(
            self.response(request),
            301,
            &request.with_query(&escape_path(&location)),
        ))
    }
}

/// 每个请求恰好记录一条日志：状态码、客户端地址、Host、方法与路径。
/// 5xx 使用 warn 级别，其余使用 info。
pub fn log_request(status: u16, request: &Request) {
    let line = format!(
        "http s={} ip={} h={} m={} u={}",
        status,
        request.remote_addr(),
        request.host(),
        request.method(),
        request.path()
    );
    if status < 500 {
        info!("{}", line);
    } else {
        warn!("{}", line);
    }
}

/// 与 `log_request` 相同，并附带错误信息
pub fn log_request_err(status: u16, request: &Request, err: &dyn Display) {
    let line = format!(
        "http s={} ip={} h={} m={} u={} err={:?}",
        status,
        request.remote_addr(),
        request.host(),
        request.method(),
        request.path(),
        err.to_string()
    );
    if status < 500 {
        info!("{}", line);
    } else {
        warn!("{}", line);
    }
}

/// 以 HTML 文档作为响应体
pub fn html_response(mut response: Response, status: u16, body: Vec<u8>) -> Response {
    response
        .set_code(status)
        .set_header(HEADER_CONTENT_TYPE, HTML_MIME)
        .set_header(HEADER_CONTENT_LENGTH, &body.len().to_string())
        .set_content(Bytes::from(body));
    response
}

/// 不带正文的重定向响应
pub fn redirect(mut response: Response, status: u16, location: &str) -> Response {
    response
        .set_code(status)
        .set_header(HEADER_LOCATION, location)
        .set_header(HEADER_CONTENT_LENGTH, "0");
    response
}

/// 对所有请求返回 404 页面的处理器
#[derive(Debug, Clone, Default)]
pub struct NotFoundHandler;

#[async_trait]
impl Handler for NotFoundHandler {
    async fn serve(&self, request: &Request) -> Response {
        log_request(404, request);
        let mut response = Response::new();
        response.set_head_only(request.is_head());
        html_response(response, 404, template::error_page(404, request.path()))
    }
}
