//! 基于 log4rs 的日志初始化。
//!
//! 全部代码只通过 `log` 门面输出日志，这里负责在启动时装配具体的输出端。

use std::path::Path;

use log::LevelFilter;
use log4rs::{
    append::{console::ConsoleAppender, file::FileAppender},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    Config,
};

use crate::exception::Exception;

const PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3fZ)(utc)} {l} {m}{n}";
const LOG_FILE: &str = "servhttp.log";

/// 构建日志配置：`dir` 为空时输出到标准输出，否则写入 `<dir>/servhttp.log`。
pub fn build_config(dir: &str) -> Result<Config, Exception> {
    let encoder = Box::new(PatternEncoder::new(PATTERN));
    let appender: Box<dyn log4rs::append::Append> = if dir.is_empty() {
        Box::new(ConsoleAppender::builder().encoder(encoder).build())
    } else {
        let path = Path::new(dir).join(LOG_FILE);
        let file = FileAppender::builder()
            .encoder(encoder)
            .build(&path)
            .map_err(|e| Exception::LoggerInit(format!("{}: {}", path.display(), e)))?;
        Box::new(file)
    };

    Config::builder()
        .appender(Appender::builder().build("main", appender))
        .build(Root::builder().appender("main").build(LevelFilter::Info))
        .map_err(|e| Exception::LoggerInit(e.to_string()))
}

/// 安装全局日志器，只能调用一次
pub fn init(dir: &str) -> Result<(), Exception> {
    let config = build_config(dir)?;
    log4rs::init_config(config).map_err(|e| Exception::LoggerInit(e.to_string()))?;
    Ok(())
}
