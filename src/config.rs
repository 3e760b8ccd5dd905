use std::{collections::BTreeMap, fs};

use log::info;
use serde_derive::{Deserialize, Serialize};

use crate::exception::Exception;

/// 配置文件的顶层结构
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// 日志目录，为空时输出到标准输出
    #[serde(default, alias = "Log")]
    log: String,
    /// 工作线程数，0 表示使用 CPU 核心数
    #[serde(default)]
    worker_threads: usize,
    /// 监听地址（`[IP]:port`）到多路复用器配置的映射
    #[serde(default, alias = "Mux")]
    mux: BTreeMap<String, Mux>,
}

/// 一个监听地址上的配置
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Mux {
    /// TLS 证书，为空时使用明文 HTTP
    #[serde(default, alias = "Cert")]
    cert: Vec<Cert>,
    /// 路由模式（`[host]/path`）到处理器配置的映射
    #[serde(default, rename = "h")]
    handlers: BTreeMap<String, HandlerConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Cert {
    #[serde(default, alias = "Root")]
    root: String,
    #[serde(default, alias = "Key")]
    key: String,
    #[serde(default, alias = "Crt")]
    crt: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct HandlerConfig {
    /// 处理器类型标签：f、m、r、s、p
    #[serde(rename = "t")]
    kind: String,
    /// 文件根目录、重定向地址或代理目标
    #[serde(default, rename = "u")]
    url: String,
    /// `Cache-Control` 响应头
    #[serde(default, rename = "c")]
    cache: String,
}

impl Config {
    /// 从 TOML 文件读取配置
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let text = fs::read_to_string(filename)
            .map_err(|e| Exception::ConfigRead(filename.to_string(), e))?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| Exception::ConfigParse(filename.to_string(), e))?;
        info!("config-load file={:?} listeners={}", filename, config.mux.len());
        Ok(config)
    }

    /// 解析 TOML 文本，错误以字符串形式返回
    pub fn from_toml_str(text: &str) -> Result<Self, String> {
        let mut config: Config = toml::from_str(text).map_err(|e| e.to_string())?;
        if config.worker_threads == 0 {
            config.worker_threads = num_cpus::get();
        }
        Ok(config)
    }
}

impl Config {
    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn mux(&self) -> &BTreeMap<String, Mux> {
        &self.mux
    }
}

impl Mux {
    pub fn new(handlers: BTreeMap<String, HandlerConfig>) -> Self {
        Self {
            cert: Vec::new(),
            handlers,
        }
    }

    pub fn cert(&self) -> &[Cert] {
        &self.cert
    }

    pub fn handlers(&self) -> &BTreeMap<String, HandlerConfig> {
        &self.handlers
    }
}

impl Cert {
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn crt(&self) -> &str {
        &self.crt
    }
}

impl HandlerConfig {
    pub fn new(kind: &str, url: &str, cache: &str) -> Self {
        Self {
            kind: kind.to_string(),
            url: url.to_string(),
            cache: cache.to_string(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cache(&self) -> &str {
        &self.cache
    }
}
