//! 处理器接口与按类型标签构造处理器的注册表。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;

use crate::{
    cache::CachedHandler,
    exception::Exception,
    file::FileHandler,
    proxy::ReverseProxyHandler,
    redirect::{RedirectHandler, SecureHandler},
    request::Request,
    response::Response,
};

/// 处理单个请求并生成响应。错误由处理器自行转换为状态码，不向上返回。
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, request: &Request) -> Response;
}

/// 构造函数的参数依次为 `u`（根目录或目标地址）与 `c`（Cache-Control）
pub type HandlerFactory = Arc<dyn Fn(&str, &str) -> Arc<dyn Handler> + Send + Sync>;

/// 类型标签到处理器构造函数的映射。
///
/// 默认注册的标签：
/// - `f` 文件处理器
/// - `m` 内存缓存处理器
/// - `r` 重定向
/// - `s` 升级到 HTTPS
/// - `p` 反向代理
#[derive(Clone)]
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("f", |root, cc| Arc::new(FileHandler::new(root, cc)))
            .register("m", |root, cc| Arc::new(CachedHandler::new(root, cc)))
            .register("r", |url, _| Arc::new(RedirectHandler::new(url)))
            .register("s", |_, _| Arc::new(SecureHandler))
            .register("p", |url, _| ReverseProxyHandler::create(url));
        registry
    }
}

impl HandlerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// 注册或覆盖一个类型标签
    pub fn register<F>(&mut self, tag: &str, factory: F) -> &mut Self
    where
        F: Fn(&str, &str) -> Arc<dyn Handler> + Send + Sync + 'static,
    {
        self.factories.insert(tag.to_string(), Arc::new(factory));
        self
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// 按标签构造处理器。部分处理器（如缓存处理器）会启动后台任务，
    /// 因此需要在 tokio 运行时中调用。
    pub fn build(
        &self,
        tag: &str,
        url: &str,
        cache_control: &str,
    ) -> Result<Arc<dyn Handler>, Exception> {
        match self.factories.get(tag) {
            Some(factory) => Ok(factory(url, cache_control)),
            None => Err(Exception::UnknownHandlerType(tag.to_string())),
        }
    }
}
