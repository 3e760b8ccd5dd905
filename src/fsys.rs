//! 文件系统抽象。
//!
//! 缓存处理器只需要两种能力：按深度优先顺序列出整棵目录树，以及读取单个文件。
//! `DirFs` 基于磁盘目录实现，`MemFs` 是一棵内存中的目录树，供测试与基准使用。

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use walkdir::WalkDir;

/// 目录树中的一个条目
#[derive(Debug, Clone, PartialEq)]
pub struct FsEntry {
    /// 相对根目录的路径，以 `/` 分隔，不含首尾斜杠
    pub path: String,
    /// 最后一级名称
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: SystemTime,
}

#[cfg_attr(test, mockall::automock)]
pub trait FileSystem: Send + Sync {
    /// 深度优先（先序）列出根目录下的全部条目，根目录本身不包含在内，
    /// 同一目录下的子项按名称排序。
    fn walk(&self) -> io::Result<Vec<FsEntry>>;

    /// 读取 `walk` 返回的某个文件的全部内容
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
}

/// 以磁盘目录为根的文件系统
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl FileSystem for DirFs {
    fn walk(&self) -> io::Result<Vec<FsEntry>> {
        let mut entries = Vec::new();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(true)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry?;
            let metadata = entry.metadata()?;
            // 管道、套接字等特殊文件不参与缓存
            if !metadata.is_dir() && !metadata.is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let path = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            entries.push(FsEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                modified: metadata.modified()?,
            });
        }
        Ok(entries)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(self.root.join(path))
    }
}

#[derive(Debug, Clone)]
struct MemNode {
    data: Option<Vec<u8>>,
    modified: SystemTime,
}

/// 内存中的目录树。添加文件时会自动补齐缺失的上级目录。
#[derive(Debug, Clone, Default)]
pub struct MemFs {
    nodes: BTreeMap<String, MemNode>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, path: &str, data: &[u8], modified: SystemTime) -> Self {
        let path = path.trim_matches('/');
        self.add_parents(path, modified);
        self.nodes.insert(
            path.to_string(),
            MemNode {
                data: Some(data.to_vec()),
                modified,
            },
        );
        self
    }

    pub fn dir(mut self, path: &str, modified: SystemTime) -> Self {
        let path = path.trim_matches('/');
        self.add_parents(path, modified);
        self.nodes.insert(
            path.to_string(),
            MemNode {
                data: None,
                modified,
            },
        );
        self
    }

    fn add_parents(&mut self, path: &str, modified: SystemTime) {
        let mut parent = path;
        while let Some((p, _)) = parent.rsplit_once('/') {
            self.nodes
                .entry(p.to_string())
                .or_insert_with(|| MemNode {
                    data: None,
                    modified,
                });
            parent = p;
        }
    }
}

impl FileSystem for MemFs {
    fn walk(&self) -> io::Result<Vec<FsEntry>> {
        let mut entries: Vec<FsEntry> = self
            .nodes
            .iter()
            .map(|(path, node)| FsEntry {
                name: path.rsplit('/').next().unwrap_or(path).to_string(),
                path: path.clone(),
                is_dir: node.data.is_none(),
                size: node.data.as_ref().map_or(0, |d| d.len() as u64),
                modified: node.modified,
            })
            .collect();
        // 按路径分段比较即得到按名称排序的先序遍历
        entries.sort_by(|a, b| a.path.split('/').cmp(b.path.split('/')));
        Ok(entries)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        match self.nodes.get(path).and_then(|n| n.data.as_ref()) {
            Some(data) => Ok(data.clone()),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("open {}: file does not exist", path),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn paths(entries: &[FsEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn test_memfs_walk_is_preorder() {
        let t = SystemTime::UNIX_EPOCH;
        let fsys = MemFs::new()
            .file("a.txt", b"x", t)
            .file("a/b.txt", b"yy", t)
            .dir("c", t);

        let entries = fsys.walk().unwrap();

        assert_eq!(paths(&entries), vec!["a", "a/b.txt", "a.txt", "c"]);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].name, "b.txt");
        assert_eq!(entries[1].size, 2);
    }

    #[test]
    fn test_memfs_read() {
        let fsys = MemFs::new().file("dir/f", b"data", SystemTime::UNIX_EPOCH);

        assert_eq!(fsys.read("dir/f").unwrap(), b"data");
        assert_eq!(
            fsys.read("dir").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn test_dirfs_walk_and_read() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("sub/deep")).unwrap();
        fs::write(tmp.path().join("sub/deep/file.txt"), b"hello").unwrap();
        fs::write(tmp.path().join("top.txt"), b"top").unwrap();

        let fsys = DirFs::new(tmp.path());
        let entries = fsys.walk().unwrap();

        assert_eq!(
            paths(&entries),
            vec!["sub", "sub/deep", "sub/deep/file.txt", "top.txt"]
        );
        assert_eq!(entries[2].size, 5);
        assert!(entries[0].modified > SystemTime::UNIX_EPOCH + Duration::from_secs(1));
        assert_eq!(fsys.read("sub/deep/file.txt").unwrap(), b"hello");
    }

    #[test]
    fn test_dirfs_missing_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let fsys = DirFs::new(tmp.path().join("missing"));

        assert!(fsys.walk().is_err());
    }
}
