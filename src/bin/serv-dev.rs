//! 开发用的单目录文件服务器：`serv-dev [-l ADDR] ROOT`
//!
//! 以文件处理器服务 ROOT，所有响应带 `Cache-Control: no-store`。

use std::{collections::BTreeMap, process::ExitCode};

use clap::Parser;
use log::{error, info};

use servhttp::{
    config::{HandlerConfig, Mux},
    logging, server, HandlerRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "serv-dev", about = "Serve a directory for development")]
struct Args {
    /// 监听地址 [ip]:port
    #[arg(short = 'l', default_value = ":8000")]
    listen: String,
    /// 要服务的目录
    #[arg(default_value = ".")]
    root: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = logging::init("") {
        eprintln!("init-fail err={:?}", e.to_string());
        return ExitCode::FAILURE;
    }

    let mux = Mux::new(BTreeMap::from([(
        "/".to_string(),
        HandlerConfig::new("f", &args.root, "no-store"),
    )]));
    info!("serve root={:?}", args.root);
    if let Err(e) = server::listen(&args.listen, &mux, &HandlerRegistry::default()).await {
        error!("listen.fail err={:?}", e.to_string());
    }
    ExitCode::FAILURE
}
