// SFTP 数据模型

pub mod path;
pub mod types;

pub use path::{is_valid_name, join_path, parent_path};
pub use types::{sort_entries, FileEntry, FileType};
