//! 重定向类处理器

use async_trait::async_trait;

use crate::{
    common::{log_request, redirect},
    handler::Handler,
    request::Request,
    response::Response,
};

/// 把请求永久重定向到 `url` 下的同名路径，例如 `url` 为 `https://www.example.com/root/` 时，
/// `/dir/a?x=1` 重定向到 `https://www.example.com/root/dir/a?x=1`。
#[derive(Debug, Clone)]
pub struct RedirectHandler {
    url: String,
}

impl RedirectHandler {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Handler for RedirectHandler {
    async fn serve(&self, request: &Request) -> Response {
        log_request(308, request);
        let location = request.with_query(&format!(
            "{}{}",
            self.url,
            request.raw_path().trim_start_matches('/')
        ));
        let mut response = Response::new();
        response.set_head_only(request.is_head());
        redirect(response, 308, &location)
    }
}

/// 把请求重定向到相同主机与路径的 HTTPS 地址
#[derive(Debug, Clone, Default)]
pub struct SecureHandler;

#[async_trait]
impl Handler for SecureHandler {
    async fn serve(&self, request: &Request) -> Response {
        log_request(308, request);
        let location =
            request.with_query(&format!("https://{}{}", request.host(), request.raw_path()));
        let mut response = Response::new();
        response.set_head_only(request.is_head());
        redirect(response, 308, &location)
    }
}
