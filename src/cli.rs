// 命令行参数解析
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shellmaster-core")]
#[command(about = "SSH/SFTP session manager")]
#[command(version)]
pub struct Cli {
    /// 不带子命令时列出主机和会话
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List saved hosts and sessions
    List,
    /// Add a host and a session for it (secret from SHELLMASTER_SECRET)
    Add {
        /// Display label
        label: String,
        /// Target as user@host[:port]
        #[arg(value_parser = parse_target)]
        target: Target,
        /// Private key path; password auth when omitted
        key_path: Option<String>,
    },
    /// Connect and run each stdin line as a command
    Connect {
        /// Session id
        session_id: String,
    },
    /// List a remote directory over SFTP
    Ls {
        /// Session id
        session_id: String,
        /// Remote directory (home directory when omitted)
        path: Option<String>,
    },
    /// Download a remote file over SFTP
    Get {
        /// Session id
        session_id: String,
        /// Remote file path
        remote_path: String,
        /// Local destination path
        local_path: PathBuf,
    },
    /// Upload a local file over SFTP
    Put {
        /// Session id
        session_id: String,
        /// Local file path
        local_path: PathBuf,
        /// Remote destination path
        remote_path: String,
    },
}

/// user@host[:port]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub user: String,
    pub host: String,
    pub port: u16,
}

/// 解析 user@host[:port]，端口缺省为 22
pub fn parse_target(target: &str) -> Result<Target, String> {
    const FORMAT: &str = "目标格式应为 user@host[:port]";

    let (user, rest) = target.split_once('@').ok_or(FORMAT)?;
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (
            host,
            port.parse::<u16>()
                .map_err(|_| format!("端口无效: {}", port))?,
        ),
        None => (rest, 22),
    };
    if user.is_empty() || host.is_empty() {
        return Err(FORMAT.to_string());
    }
    Ok(Target {
        user: user.to_string(),
        host: host.to_string(),
        port,
    })
}
