// ShellMaster - SSH/SFTP 会话管理
// 命令行入口
//
// 密码或私钥口令通过 SHELLMASTER_SECRET 环境变量传入。

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shellmaster_core::models::{HostData, OutputKind};
use shellmaster_core::services::credentials::{CredentialStore, MemoryCredentialStore, Secret};
use shellmaster_core::services::storage::Storage;
use shellmaster_core::ssh::{HostKeyVerifier, RusshConnector};
use shellmaster_core::{ReconnectSupervisor, SessionEvent, SessionRegistry};

use cli::{Cli, Commands, Target};

const SECRET_ENV: &str = "SHELLMASTER_SECRET";

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    // 可以通过 RUST_LOG 环境变量控制日志级别，例如：RUST_LOG=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false) // 不显示 target（模块路径）
        .init();

    // 多线程运行时，所有 SSH 任务都在这里执行
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("ssh-worker")
        .build()
        .context("无法创建 Tokio 运行时")?;

    runtime.block_on(run(cli.command.unwrap_or(Commands::List)))
}

async fn run(command: Commands) -> Result<()> {
    let storage = Storage::default_location()?;
    let settings = storage.load_settings()?;

    let verifier = Arc::new(HostKeyVerifier::load(
        storage.clone(),
        settings.connection.strict_host_key_checking,
    )?);
    let connector = Arc::new(RusshConnector::new(verifier, settings.connection.clone()));
    let credentials = Arc::new(MemoryCredentialStore::new());

    let registry = SessionRegistry::load(
        storage,
        settings.clone(),
        connector,
        credentials.clone(),
    )?;

    // 内存凭据存储不跨进程保留，启动时从环境变量补上
    if let Ok(secret) = std::env::var(SECRET_ENV) {
        for host in registry.hosts() {
            credentials.store(&host.id, Secret::new(secret.clone()));
        }
    }

    match command {
        Commands::List => {
            list(&registry);
            Ok(())
        }
        Commands::Add {
            label,
            target,
            key_path,
        } => add(&registry, &label, target, key_path),
        Commands::Connect { session_id } => {
            let supervisor =
                ReconnectSupervisor::new(registry.clone(), &settings.connection).spawn();
            let result = interactive(&registry, &session_id).await;
            drop(supervisor);
            registry.disconnect_all().await;
            result
        }
        Commands::Ls { session_id, path } => {
            let result = list_remote(&registry, &session_id, path.as_deref()).await;
            registry.disconnect_all().await;
            result
        }
        Commands::Get {
            session_id,
            remote_path,
            local_path,
        } => {
            let result = download(&registry, &session_id, &remote_path, &local_path).await;
            registry.disconnect_all().await;
            result
        }
        Commands::Put {
            session_id,
            local_path,
            remote_path,
        } => {
            let result = upload(&registry, &session_id, &local_path, &remote_path).await;
            registry.disconnect_all().await;
            result
        }
    }
}

fn list(registry: &SessionRegistry) {
    for host in registry.hosts() {
        println!("host    {}  {}  {}", host.id, host.label, host.display_target());
    }
    for session in registry.sessions() {
        let marker = if session.is_active { "*" } else { " " };
        println!(
            "session {} {} {}  host={}  {}",
            marker, session.id, session.name, session.host_id, session.status
        );
    }
}

fn add(
    registry: &SessionRegistry,
    label: &str,
    target: Target,
    key_path: Option<String>,
) -> Result<()> {
    let host = match key_path {
        Some(key_path) => {
            HostData::with_public_key(label, target.host, target.port, target.user, key_path)
        }
        None => HostData::with_password(label, target.host, target.port, target.user),
    };
    let secret = std::env::var(SECRET_ENV).ok().map(Secret::from);
    let host = registry.add_host(host, secret)?;
    let session = registry.create_session(&host.id, label)?;

    println!("host    {}", host.id);
    println!("session {}", session.id);
    Ok(())
}

async fn list_remote(
    registry: &SessionRegistry,
    session_id: &str,
    path: Option<&str>,
) -> Result<()> {
    registry.connect(session_id).await?;
    let sftp = registry.open_sftp(session_id).await?;
    let path = match path {
        Some(path) => path.to_string(),
        None => sftp.home_dir().await?,
    };

    for entry in sftp.list(&path).await? {
        println!(
            "{} {:>8} {:>8} {:>10}  {}",
            entry.permission_string(),
            entry.owner,
            entry.group,
            entry.size,
            entry.name
        );
    }
    Ok(())
}

async fn download(
    registry: &SessionRegistry,
    session_id: &str,
    remote_path: &str,
    local_path: &Path,
) -> Result<()> {
    registry.connect(session_id).await?;
    let sftp = registry.open_sftp(session_id).await?;

    let mut file = tokio::fs::File::create(local_path)
        .await
        .with_context(|| format!("无法创建本地文件: {}", local_path.display()))?;
    let read = sftp
        .download(remote_path, &mut file, &ctrl_c_token(), |_| {})
        .await?;

    info!("Downloaded {} bytes to {}", read, local_path.display());
    Ok(())
}

async fn upload(
    registry: &SessionRegistry,
    session_id: &str,
    local_path: &Path,
    remote_path: &str,
) -> Result<()> {
    registry.connect(session_id).await?;
    let sftp = registry.open_sftp(session_id).await?;

    let mut file = tokio::fs::File::open(local_path)
        .await
        .with_context(|| format!("无法打开本地文件: {}", local_path.display()))?;
    let written = sftp
        .upload(&mut file, remote_path, &ctrl_c_token(), |_| {})
        .await?;

    info!("Uploaded {} bytes to {}", written, remote_path);
    Ok(())
}

/// Ctrl-C 时取消的令牌
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

/// 连接会话，打印输出，把标准输入逐行当作命令执行
async fn interactive(registry: &SessionRegistry, session_id: &str) -> Result<()> {
    let mut events = registry.subscribe();
    let printer_id = session_id.to_string();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Output { session_id, entry }) if session_id == printer_id => {
                    match entry.kind {
                        OutputKind::Stdout => print!("{}", entry.content),
                        OutputKind::Stderr | OutputKind::Error => eprint!("{}", entry.content),
                        OutputKind::Command => println!("$ {}", entry.content),
                        OutputKind::System => println!("[{}]", entry.content),
                    }
                }
                Ok(SessionEvent::Stage { session_id, stage }) if session_id == printer_id => {
                    info!("{} ({:.0}%)", stage.label(), stage.progress() * 100.0);
                }
                Ok(SessionEvent::ConnectFailed { session_id, error })
                    if session_id == printer_id =>
                {
                    warn!("Connection attempt failed: {}", error);
                }
                Ok(SessionEvent::HostKeyRejected {
                    fingerprint,
                    expected,
                    ..
                }) => {
                    warn!(
                        "Host key rejected: {} (known: {})",
                        fingerprint,
                        expected.as_deref().unwrap_or("none")
                    );
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Dropped {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    registry.set_active(Some(session_id))?;
    registry.connect(session_id).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("读取标准输入失败")? else {
                    break;
                };
                let command = line.trim();
                if command.is_empty() {
                    continue;
                }
                if command == "exit" {
                    break;
                }
                // 失败已写入输出日志
                if let Err(e) = registry.execute_command(session_id, command).await {
                    warn!("{}", e);
                }
            }
        }
    }

    registry.disconnect(session_id).await?;
    printer.abort();
    Ok(())
}
