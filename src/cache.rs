use std::{
    collections::{BTreeSet, HashMap},
    io::{self, Write},
    sync::Arc,
    time::SystemTime,
};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use bytes::Bytes;
use flate2::{write::DeflateEncoder, Compression};
use log::{debug, error, warn};
use sha2::{Digest, Sha256};
use tokio::time::{interval, MissedTickBehavior};

use crate::{
    common::{html_response, log_request, Common},
    fsys::{DirFs, FileSystem},
    handler::Handler,
    param::*,
    request::Request,
    response::Response,
    template::{self, ListingEntry},
    util::{clean_path, http_date},
};

/// 一个资源（文件或目录）预先计算好的响应内容。构造后不再修改。
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// 目录（含由 index.html 或自动生成的索引页代表的目录）
    is_dir: bool,
    content_type: String,
    modified: SystemTime,
    /// `Last-Modified` 响应头
    modified_header: String,
    etag: String,
    identity: Bytes,
    identity_len: String,
    /// deflate 压缩后的内容，只有比原文严格更小时才保留
    deflate: Option<Bytes>,
    deflate_len: String,
}

impl CacheEntry {
    /// 计算内容类型、ETag（SHA-256，base64url 无填充，带引号）与 deflate 压缩版本
    pub fn encode(content: Vec<u8>, name: &str, is_dir: bool, modified: SystemTime) -> Self {
        let etag = format!("\"{}\"", URL_SAFE_NO_PAD.encode(Sha256::digest(&content)));
        let deflate = compress(&content)
            .ok()
            .filter(|c| c.len() < content.len())
            .map(Bytes::from);

        Self {
            is_dir,
            content_type: mime_by_name(name).to_string(),
            modified,
            modified_header: http_date(modified),
            etag,
            identity_len: content.len().to_string(),
            identity: Bytes::from(content),
            deflate_len: deflate.as_ref().map_or(String::new(), |d| d.len().to_string()),
            deflate,
        }
    }
}

fn compress(content: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(content)?;
    encoder.finish()
}

impl CacheEntry {
    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn modified_header(&self) -> &str {
        &self.modified_header
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn identity(&self) -> &Bytes {
        &self.identity
    }

    pub fn identity_len(&self) -> &str {
        &self.identity_len
    }

    pub fn deflate(&self) -> Option<&Bytes> {
        self.deflate.as_ref()
    }

    pub fn deflate_len(&self) -> &str {
        &self.deflate_len
    }
}

/// 某一次刷新得到的完整快照：规范化路径（无首尾 `/`，根目录为空串）到缓存项的映射。
#[derive(Debug, Clone, Default)]
pub struct CacheTable {
    entries: HashMap<String, Arc<CacheEntry>>,
}

impl CacheTable {
    /// 遍历文件系统生成新的快照。
    ///
    /// 修改时间与 `previous` 中同一路径完全相同的文件直接复用原有的 `Arc`，不再读取。
    /// 没有 `index.html` 的目录生成一份目录索引页，时间戳为 `now`。
    /// 遍历或读取过程中的任何错误都会中止本次构建。
    pub fn rebuild(
        fsys: &dyn FileSystem,
        previous: &CacheTable,
        now: SystemTime,
    ) -> io::Result<CacheTable> {
        let mut entries = HashMap::with_capacity(previous.len());
        let mut need_index = BTreeSet::from([String::new()]);
        let mut dirs: HashMap<String, Vec<ListingEntry>> = HashMap::new();

        for item in fsys.walk()? {
            let parent = item.path.rsplit_once('/').map_or("", |(p, _)| p);
            dirs.entry(parent.to_string()).or_default().push(ListingEntry {
                name: item.name.clone(),
                size: item.size,
                modified: item.modified,
                is_dir: item.is_dir,
            });

            if item.is_dir {
                need_index.insert(item.path);
                continue;
            }

            let is_index = item.name == INDEX_FILE;
            let key = if is_index {
                need_index.remove(parent);
                parent.to_string()
            } else {
                item.path.clone()
            };

            let entry = match previous.get(&key) {
                Some(old) if old.modified == item.modified && old.is_dir == is_index => {
                    Arc::clone(old)
                }
                _ => Arc::new(CacheEntry::encode(
                    fsys.read(&item.path)?,
                    &item.name,
                    is_index,
                    item.modified,
                )),
            };
            entries.insert(key, entry);
        }

        for dir in need_index {
            let path = if dir.is_empty() {
                "/".to_string()
            } else {
                format!("/{}/", dir)
            };
            let listing = dirs.get(&dir).map_or(&[][..], Vec::as_slice);
            let entry = CacheEntry::encode(template::index(&path, listing), INDEX_FILE, true, now);
            entries.insert(dir, Arc::new(entry));
        }

        Ok(CacheTable { entries })
    }

    pub fn get(&self, path: &str) -> Option<&Arc<CacheEntry>> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl FromIterator<(String, Arc<CacheEntry>)> for CacheTable {
    fn from_iter<I: IntoIterator<Item = (String, Arc<CacheEntry>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// 内存缓存处理器：后台每 20 秒重建一次快照，请求只读取当前快照。
pub struct CachedHandler {
    common: Common,
    table: Arc<ArcSwap<CacheTable>>,
}

impl CachedHandler {
    /// 以 `root` 目录创建处理器并启动后台刷新任务，必须在 tokio 运行时中调用。
    /// 第一次构建完成前所有请求都返回 404。
    pub fn new(root: &str, cache_control: &str) -> Self {
        let handler = Self::with_table(cache_control, CacheTable::default());
        let fsys: Arc<dyn FileSystem> = Arc::new(DirFs::new(root));
        tokio::spawn(refresh_loop(Arc::clone(&handler.table), fsys));
        handler
    }

    /// 使用给定的快照创建处理器，不启动后台任务
    pub fn with_table(cache_control: &str, table: CacheTable) -> Self {
        Self {
            common: Common::new(cache_control),
            table: Arc::new(ArcSwap::from_pointee(table)),
        }
    }

    /// 立即重建一次快照；失败时记录日志并保留原快照
    pub fn update(&self, fsys: &dyn FileSystem, now: SystemTime) {
        update(&self.table, fsys, now);
    }

    /// 当前快照
    pub fn table(&self) -> Arc<CacheTable> {
        self.table.load_full()
    }

    pub fn respond(&self, request: &Request) -> Response {
        if let Some(response) = self.common.filter(request) {
            return response;
        }

        let table = self.table.load();
        let entry = match table.get(&clean_path(request.path())) {
            Some(entry) => entry,
            None => {
                log_request(404, request);
                return html_response(
                    self.common.response(request),
                    404,
                    template::error_page(404, request.path()),
                );
            }
        };
        if let Some(response) = self.common.end_slash(request, entry.is_dir) {
            return response;
        }

        let mut response = self.common.response(request);
        if !entry.content_type.is_empty() {
            response.add_header(HEADER_CONTENT_TYPE, &entry.content_type);
        }
        response
            .add_header(HEADER_LAST_MODIFIED, &entry.modified_header)
            .add_header(HEADER_ETAG, &entry.etag);

        if request.header(HEADER_IF_NONE_MATCH) == Some(entry.etag.as_str()) {
            log_request(304, request);
            response.set_code(304);
            return response;
        }

        log_request(200, request);
        match &entry.deflate {
            Some(deflate) if accept_deflate(request.header(HEADER_ACCEPT_ENCODING)) => {
                response
                    .add_header(HEADER_CONTENT_ENCODING, DEFLATE_ENCODING)
                    .add_header(HEADER_CONTENT_LENGTH, &entry.deflate_len)
                    .set_content(deflate.clone());
            }
            _ => {
                response
                    .add_header(HEADER_CONTENT_LENGTH, &entry.identity_len)
                    .set_content(entry.identity.clone());
            }
        }
        response
    }
}

#[async_trait]
impl Handler for CachedHandler {
    async fn serve(&self, request: &Request) -> Response {
        self.respond(request)
    }
}

/// `Accept-Encoding` 按非字母字符切分，任一记号为 deflate（大小写不敏感）即接受
fn accept_deflate(header: Option<&str>) -> bool {
    header.map_or(false, |h| {
        h.split(|c: char| !c.is_alphabetic())
            .any(|token| token.eq_ignore_ascii_case(DEFLATE_ENCODING))
    })
}

fn update(slot: &ArcSwap<CacheTable>, fsys: &dyn FileSystem, now: SystemTime) {
    let previous = slot.load();
    match CacheTable::rebuild(fsys, &previous, now) {
        Ok(table) => {
            debug!("cache-update entries={}", table.len());
            slot.store(Arc::new(table));
        }
        Err(e) => warn!("cache-update-fail err={:?}", e.to_string()),
    }
}

/// 首次立即构建，之后每隔 `REFRESH_INTERVAL` 重建；处理器被释放后退出。
async fn refresh_loop(slot: Arc<ArcSwap<CacheTable>>, fsys: Arc<dyn FileSystem>) {
    let mut ticker = interval(REFRESH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if Arc::strong_count(&slot) == 1 {
            debug!("cache-refresh-stop");
            return;
        }

        let (slot, fsys) = (Arc::clone(&slot), Arc::clone(&fsys));
        let result = tokio::task::spawn_blocking(move || {
            update(&slot, fsys.as_ref(), SystemTime::now());
        })
        .await;
        if let Err(e) = result {
            error!("cache-update-panic err={:?}", e.to_string());
        }
    }
}
