// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # servhttp
//!
//! 按配置文件在多个地址上监听，每个地址按路由模式把请求交给文件、内存缓存、
//! 重定向或反向代理处理器。

use std::process::ExitCode;

use clap::Parser;
use log::error;
use tokio::runtime::Builder;

use servhttp::{config::Config, logging, server, HandlerRegistry};

#[derive(Parser, Debug)]
#[command(name = "servhttp", version, about = "Configurable HTTP content server")]
struct Args {
    /// 配置文件路径
    #[arg(default_value = "/etc/servhttp.toml")]
    config: String,
}

/// # 程序入口点
///
/// 载入配置、初始化日志、按配置的线程数构建运行时并启动全部监听。
/// 所有监听都停止后以状态码 1 退出。
fn main() -> ExitCode {
    let args = Args::parse();

    let config = match Config::from_toml(&args.config) {
        Ok(config) => config,
        Err(e) => {
            // 日志目录来自配置文件，此时只能输出到控制台
            if logging::init("").is_ok() {
                error!("init-fail err={:?}", e.to_string());
            } else {
                eprintln!("init-fail err={:?}", e.to_string());
            }
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(config.log()) {
        eprintln!("init-fail err={:?}", e.to_string());
        return ExitCode::FAILURE;
    }

    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("init-fail err={:?}", e.to_string());
            return ExitCode::FAILURE;
        }
    };

    let registry = HandlerRegistry::default();
    runtime.block_on(server::run(&config, &registry));
    ExitCode::FAILURE
}
