//! 按主机名与路径前缀把请求分派给处理器。
//!
//! 路由模式写作 `[host]/path`：
//! - 以 `/` 结尾的模式匹配整棵子树，否则只匹配完全相同的路径；
//! - 多个模式都匹配时取最长的一个；
//! - 带主机名的模式优先于不带主机名的模式，请求主机名中的端口会被忽略；
//! - 只注册了 `/tree/` 时，对 `/tree` 的请求会被 301 重定向到 `/tree/`。

use std::sync::Arc;

use crate::{
    common::{log_request, redirect, NotFoundHandler},
    config::Mux,
    exception::Exception,
    handler::{Handler, HandlerRegistry},
    request::Request,
    response::Response,
};

struct Route {
    /// 小写主机名，为空表示任意主机
    host: String,
    path: String,
    handler: Arc<dyn Handler>,
}

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    has_hosts: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根据监听地址的配置构建路由表，每个模式通过注册表构造一个处理器
    pub fn from_mux(mux: &Mux, registry: &HandlerRegistry) -> Result<Self, Exception> {
        let mut router = Self::new();
        for (pattern, config) in mux.handlers() {
            let handler = registry.build(config.kind(), config.url(), config.cache())?;
            router.handle(pattern, handler)?;
        }
        Ok(router)
    }

    /// 注册一个模式，重复注册时后者覆盖前者
    pub fn handle(&mut self, pattern: &str, handler: Arc<dyn Handler>) -> Result<&mut Self, Exception> {
        let (host, path) = match pattern.find('/') {
            Some(i) => (&pattern[..i], &pattern[i..]),
            None => return Err(Exception::InvalidPattern(pattern.to_string())),
        };
        let host = host.to_ascii_lowercase();
        self.routes.retain(|r| !(r.host == host && r.path == path));
        self.has_hosts |= !host.is_empty();
        self.routes.push(Route {
            host,
            path: path.to_string(),
            handler,
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn find(&self, host: &str, path: &str) -> Option<&Route> {
        if self.has_hosts {
            if let Some(route) = self.find_for(host, path) {
                return Some(route);
            }
        }
        self.find_for("", path)
    }

    fn find_for(&self, host: &str, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .filter(|r| r.host == host)
            .filter(|r| match r.path.ends_with('/') {
                true => path.starts_with(&r.path),
                false => path == r.path,
            })
            .max_by_key(|r| r.path.len())
    }

    /// 存在 `path/` 子树模式、但没有精确匹配 `path` 的模式时需要补上斜杠
    fn needs_slash(&self, host: &str, path: &str) -> bool {
        if path.ends_with('/') {
            return false;
        }
        let with_slash = format!("{}/", path);
        let registered = |p: &str| {
            self.routes
                .iter()
                .any(|r| r.path == p && (r.host.is_empty() || r.host == host))
        };
        !registered(path) && registered(&with_slash)
    }

    pub async fn dispatch(&self, request: &Request) -> Response {
        let host = strip_port(request.host()).to_ascii_lowercase();
        let path = request.path();

        if self.needs_slash(&host, path) {
            log_request(301, request);
            let location = request.with_query(&format!("{}/", request.raw_path()));
            let mut response = Response::new();
            response.set_head_only(request.is_head());
            return redirect(response, 301, &location);
        }

        match self.find(&host, path) {
            Some(route) => route.handler.serve(request).await,
            None => NotFoundHandler.serve(request).await,
        }
    }
}

/// 去掉 `Host` 中的端口，IPv6 地址同时去掉方括号
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((h, p))
            if p.bytes().all(|b| b.is_ascii_digit()) && (!h.contains(':') || h.ends_with(']')) =>
        {
            h.trim_start_matches('[').trim_end_matches(']')
        }
        _ => host,
    }
}
