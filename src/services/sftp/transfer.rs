// 分块传输
// 上传与下载共用：按固定大小读写，每块之间检查取消

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::error::SftpError;

/// 默认分块大小 (32 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// 把 reader 的全部内容按 chunk_size 分块写入 writer
///
/// 每写完一块调用一次 `progress(已传输字节数)`。取消时返回
/// `SftpError::Cancelled`，已写入的部分保留。
pub async fn copy_chunked<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    chunk_size: usize,
    cancel: &CancellationToken,
    mut progress: F,
) -> Result<u64, SftpError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
    F: FnMut(u64),
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut transferred = 0u64;

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SftpError::Cancelled),
            read = reader.read(&mut buf) => read?,
        };
        if n == 0 {
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SftpError::Cancelled),
            written = writer.write_all(&buf[..n]) => written?,
        }

        transferred += n as u64;
        progress(transferred);
    }

    writer.flush().await?;
    Ok(transferred)
}
