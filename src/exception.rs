// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务器在启动与请求解析阶段可能出现的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖协议解析错误、配置错误以及监听器启动错误。
//! - **边界清晰**：请求路由中的"找不到"、"方法不允许"不属于异常，
//!   它们由各个处理器直接转化为对应的 HTTP 状态码。
//! - **可记录**：通过实现 `std::fmt::Display`，错误信息可以直接写入日志。

use std::{error, fmt, io};

/// 服务器运行过程中发生的异常类型。
#[derive(Debug)]
pub enum Exception {
    /// 客户端发送的请求头无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行格式不正确（缺少方法、路径或版本）。
    MalformedRequest,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    UnsupportedHttpVersion,
    /// 请求头超过了服务器允许的最大长度。
    RequestTooLarge,
    /// 请求体超过了服务器允许的最大长度。
    BodyTooLarge,
    /// 配置文件无法读取。
    ConfigRead(String, io::Error),
    /// 配置文件不是合法的 TOML，或字段类型不匹配。
    ConfigParse(String, String),
    /// 配置中出现了未注册的处理器类型标签。
    UnknownHandlerType(String),
    /// 路由模式不合法（路径部分必须以 `/` 开头）。
    InvalidPattern(String),
    /// 当前构建不支持 TLS 监听。
    TlsUnsupported(String),
    /// 日志系统初始化失败。
    LoggerInit(String),
    /// 其他带上下文的 I/O 错误（绑定端口、接受连接等）。
    Io(String, io::Error),
}

use Exception::*;

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed request line"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            RequestTooLarge => write!(f, "Request header is too large"),
            BodyTooLarge => write!(f, "Request body is too large"),
            ConfigRead(path, e) => write!(f, "read config file {:?}: {}", path, e),
            ConfigParse(path, e) => write!(f, "decode config file {:?}: {}", path, e),
            UnknownHandlerType(tag) => write!(f, "unknown handler type: {:?}", tag),
            InvalidPattern(pattern) => write!(f, "invalid route pattern: {:?}", pattern),
            TlsUnsupported(address) => {
                write!(f, "TLS certificates configured for {} but TLS is not supported", address)
            }
            LoggerInit(e) => write!(f, "logger init: {}", e),
            Io(context, e) => write!(f, "{}: {}", context, e),
        }
    }
}

impl error::Error for Exception {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ConfigRead(_, e) | Io(_, e) => Some(e),
            _ => None,
        }
    }
}
