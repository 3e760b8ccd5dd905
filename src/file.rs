//! 直接读取磁盘的文件处理器：每个请求都重新检查文件，适合内容频繁变动的目录。

use std::{
    fs::Metadata,
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use crate::{
    common::{html_response, log_request, log_request_err, Common},
    handler::Handler,
    param::*,
    request::Request,
    response::Response,
    template::{self, ListingEntry},
    util::{clean_path, http_date, parse_http_date},
};

const OCTET_STREAM: &str = "application/octet-stream";

pub struct FileHandler {
    common: Common,
    root: PathBuf,
}

impl FileHandler {
    pub fn new(root: &str, cache_control: &str) -> Self {
        Self {
            common: Common::new(cache_control),
            root: PathBuf::from(root),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn not_found(&self, request: &Request) -> Response {
        log_request(404, request);
        html_response(
            self.common.response(request),
            404,
            template::error_page(404, request.path()),
        )
    }

    fn internal_error(&self, request: &Request, err: &io::Error) -> Response {
        log_request_err(500, request, err);
        html_response(
            self.common.response(request),
            500,
            template::error_page(500, request.path()),
        )
    }

    async fn serve_file(&self, request: &Request, path: &Path, metadata: &Metadata) -> Response {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = match mime_by_name(&name) {
            "" => OCTET_STREAM,
            t => t,
        };

        let mut response = self.common.response(request);
        response
            .add_header(HEADER_CONTENT_TYPE, content_type)
            .add_header(HEADER_LAST_MODIFIED, &http_date(modified));

        if not_modified(request.header(HEADER_IF_MODIFIED_SINCE), modified) {
            log_request(304, request);
            response.set_code(304);
            return response;
        }

        match fs::read(path).await {
            Ok(content) => {
                log_request(200, request);
                response
                    .add_header(HEADER_CONTENT_LENGTH, &content.len().to_string())
                    .set_content(Bytes::from(content));
                response
            }
            Err(e) => self.internal_error(request, &e),
        }
    }
}

#[async_trait]
impl Handler for FileHandler {
    async fn serve(&self, request: &Request) -> Response {
        if let Some(response) = self.common.filter(request) {
            return response;
        }

        let path = self.root.join(clean_path(request.path()));
        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if is_not_found(&e) => return self.not_found(request),
            Err(e) => return self.internal_error(request, &e),
        };
        if let Some(response) = self.common.end_slash(request, metadata.is_dir()) {
            return response;
        }
        if !metadata.is_dir() {
            return self.serve_file(request, &path, &metadata).await;
        }

        let index = path.join(INDEX_FILE);
        if let Ok(index_metadata) = fs::metadata(&index).await {
            if index_metadata.is_file() {
                return self.serve_file(request, &index, &index_metadata).await;
            }
        }

        match list_dir(&path).await {
            Ok(entries) => {
                log_request(200, request);
                html_response(
                    self.common.response(request),
                    200,
                    template::index(request.path(), &entries),
                )
            }
            Err(e) => self.internal_error(request, &e),
        }
    }
}

/// 路径中某一级不是目录（如 `/file.txt/x`）或含有空字节时同样视为不存在
fn is_not_found(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory | io::ErrorKind::InvalidInput
    )
}

/// `If-Modified-Since` 不早于修改时间（精确到秒）时返回 true
fn not_modified(header: Option<&str>, modified: SystemTime) -> bool {
    let since = match header.and_then(parse_http_date) {
        Some(since) => since,
        None => return false,
    };
    let secs = |t: SystemTime| {
        t.duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    };
    secs(modified) <= secs(since)
}

async fn list_dir(path: &Path) -> io::Result<Vec<ListingEntry>> {
    let mut dir = fs::read_dir(path).await?;
    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        // 失效的符号链接按链接本身列出
        let metadata = match fs::metadata(entry.path()).await {
            Ok(metadata) => metadata,
            Err(_) => entry.metadata().await?,
        };
        entries.push(ListingEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified: metadata.modified()?,
            is_dir: metadata.is_dir(),
        });
    }
    Ok(entries)
}
