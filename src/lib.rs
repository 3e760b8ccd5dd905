pub mod cache;
pub mod common;
pub mod config;
pub mod exception;
pub mod file;
pub mod fsys;
pub mod handler;
pub mod logging;
pub mod param;
pub mod proxy;
pub mod redirect;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod template;
pub mod util;

pub use cache::{CacheEntry, CacheTable, CachedHandler};
pub use config::Config;
pub use exception::Exception;
pub use fsys::{DirFs, FileSystem, FsEntry, MemFs};
pub use handler::{Handler, HandlerRegistry};
pub use param::{HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::Response;
pub use router::Router;
