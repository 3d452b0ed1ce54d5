// SFTP 基础数据类型

use std::time::SystemTime;

/// 文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileType {
    #[default]
    File,
    Directory,
    Symlink,
}

/// 文件条目（每次列目录时刷新，不跨目录缓存）
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    /// 完整路径
    pub path: String,
    pub file_type: FileType,
    /// 文件大小（字节）
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Unix 权限位（如 0o755）
    pub permissions: u32,
    /// 所有者（服务器未提供用户名时为 uid）
    pub owner: String,
    /// 所属组（服务器未提供组名时为 gid）
    pub group: String,
}

impl FileEntry {
    pub fn new(name: String, path: String, file_type: FileType) -> Self {
        Self {
            name,
            path,
            file_type,
            size: 0,
            modified: None,
            permissions: 0,
            owner: "-".to_string(),
            group: "-".to_string(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// 格式化权限字符串（如 drwxr-xr-x）
    pub fn permission_string(&self) -> String {
        const BITS: [(u32, char); 9] = [
            (0o400, 'r'),
            (0o200, 'w'),
            (0o100, 'x'),
            (0o040, 'r'),
            (0o020, 'w'),
            (0o010, 'x'),
            (0o004, 'r'),
            (0o002, 'w'),
            (0o001, 'x'),
        ];

        let type_char = match self.file_type {
            FileType::Directory => 'd',
            FileType::Symlink => 'l',
            FileType::File => '-',
        };

        std::iter::once(type_char)
            .chain(BITS.iter().map(|&(bit, c)| {
                if self.permissions & bit != 0 {
                    c
                } else {
                    '-'
                }
            }))
            .collect()
    }
}

/// 列表排序：目录在前，其余按名称
pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| b.is_dir().cmp(&a.is_dir()).then_with(|| a.name.cmp(&b.name)));
}
