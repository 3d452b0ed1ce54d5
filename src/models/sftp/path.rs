// 远程路径工具函数（SFTP 路径始终使用 '/'）

/// 获取父目录路径
pub fn parent_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => trimmed[..pos].to_string(),
    }
}

/// 拼接目录与名称
pub fn join_path(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    format!("{}/{}", base, name.trim_start_matches('/'))
}

/// 校验单级文件名（不能为空、不能包含路径分隔符或 . / ..）
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}
