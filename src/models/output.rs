// 会话输出日志（仅内存）

use std::collections::VecDeque;

use chrono::{DateTime, Local};

/// 输出条目类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputKind {
    /// 命令回显
    Command,
    Stdout,
    Stderr,
    /// 系统通知（连接、断开、重连等）
    System,
    /// 错误信息
    Error,
}

/// 输出条目
#[derive(Clone, Debug, PartialEq)]
pub struct OutputEntry {
    pub content: String,
    pub timestamp: DateTime<Local>,
    pub kind: OutputKind,
}

impl OutputEntry {
    pub fn new(kind: OutputKind, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: Local::now(),
            kind,
        }
    }

    pub fn command(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Command, content)
    }

    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Stdout, content)
    }

    pub fn stderr(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Stderr, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(OutputKind::System, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Error, content)
    }
}

/// 追加式输出日志，超过上限时丢弃最旧的条目
#[derive(Debug)]
pub struct OutputLog {
    entries: VecDeque<OutputEntry>,
    max_entries: usize,
}

impl OutputLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn push(&mut self, entry: OutputEntry) {
        if self.entries.len() == self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 拷贝当前所有条目（按追加顺序）
    pub fn snapshot(&self) -> Vec<OutputEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// 按流解码 UTF-8 输出
///
/// 多字节字符可能被拆到两个数据块里，不完整的尾部字节留到下一块再解码。
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解码一块数据，返回当前能输出的文本（可能为空）
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // 非法字节：替换后继续
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                        // 字符未完整
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    /// 流结束时输出剩余字节
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}
