//! ClamAV client speaking clamd's INSTREAM protocol over TCP.
//!
//! Wire format: the command `zINSTREAM\0`, then the payload as a sequence of chunks,
//! each prefixed with its length as a 4-byte big-endian integer, then a zero-length
//! chunk. clamd replies with a single line such as `stream: OK` or
//! `stream: Eicar-Test-Signature FOUND`.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use assetflow_core::{MalwareScanner, ScanResult};

const INSTREAM_COMMAND: &[u8] = b"zINSTREAM\0";
const CHUNK_SIZE: usize = 2048;

#[derive(Debug, Clone)]
pub struct ClamAVService {
    host: String,
    port: u16,
    connect_timeout: Duration,
    /// Bounds the whole exchange after connecting: streaming the payload and reading
    /// the verdict.
    read_timeout: Duration,
}

impl ClamAVService {
    pub fn new(host: String, port: u16) -> Self {
        Self::with_timeouts(host, port, Duration::from_secs(5), Duration::from_secs(60))
    }

    pub fn with_timeouts(
        host: String,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            host,
            port,
            connect_timeout,
            read_timeout,
        }
    }

    pub async fn scan_bytes(&self, data: &[u8]) -> ScanResult {
        self.scan_reader(data).await
    }

    /// Stream `source` to clamd and interpret the reply. Never returns `Infected` for a
    /// transport failure.
    pub async fn scan_reader<R>(&self, source: R) -> ScanResult
    where
        R: AsyncRead + Unpin + Send,
    {
        let start = Instant::now();
        tracing::debug!(host = %self.host, port = self.port, "Starting ClamAV scan");

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::error!(error = %e, host = %self.host, port = self.port, "ClamAV connect failed");
                return ScanResult::Error(format!("ClamAV connect failed: {}", e));
            }
            Err(_) => {
                tracing::error!(host = %self.host, port = self.port, "ClamAV connect timed out");
                return ScanResult::Error(format!(
                    "ClamAV connect timeout (exceeded {} seconds)",
                    self.connect_timeout.as_secs()
                ));
            }
        };

        let response =
            match tokio::time::timeout(self.read_timeout, instream(stream, source)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "ClamAV scan failed");
                    return ScanResult::Error(format!("ClamAV scan error: {}", e));
                }
                Err(_) => {
                    tracing::error!("ClamAV scan timeout");
                    return ScanResult::Error(format!(
                        "ClamAV scan timeout (exceeded {} seconds)",
                        self.read_timeout.as_secs()
                    ));
                }
            };

        let result = parse_response(&response);
        match &result {
            ScanResult::Clean => tracing::info!(
                duration_ms = start.elapsed().as_millis() as u64,
                "File scan completed: clean"
            ),
            ScanResult::Infected(signature) => tracing::warn!(
                duration_ms = start.elapsed().as_millis() as u64,
                virus = %signature,
                "File scan detected virus"
            ),
            ScanResult::Error(msg) => {
                tracing::error!(response = %msg, "Unexpected ClamAV response")
            }
        }
        result
    }
}

#[async_trait]
impl MalwareScanner for ClamAVService {
    async fn scan_file(&self, path: &Path) -> ScanResult {
        match tokio::fs::File::open(path).await {
            Ok(file) => self.scan_reader(file).await,
            Err(e) => ScanResult::Error(format!("Cannot open {}: {}", path.display(), e)),
        }
    }
}

async fn instream<R>(mut stream: TcpStream, mut source: R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    stream.write_all(INSTREAM_COMMAND).await?;

    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        stream.write_all(&(n as u32).to_be_bytes()).await?;
        stream.write_all(&buf[..n]).await?;
    }
    stream.write_all(&[0u8; 4]).await?;
    stream.flush().await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(response)
}

/// `FOUND` wins over `OK`; anything else is not a verdict.
pub(crate) fn parse_response(raw: &[u8]) -> ScanResult {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim_end_matches('\0').trim();

    if text.contains("FOUND") {
        let signature = text
            .split_once(':')
            .map_or(text, |(_, rest)| rest)
            .trim()
            .trim_end_matches("FOUND")
            .trim();
        let signature = if signature.is_empty() {
            "unknown"
        } else {
            signature
        };
        return ScanResult::Infected(signature.to_string());
    }

    if text.contains("OK") {
        return ScanResult::Clean;
    }

    ScanResult::Error(if text.is_empty() {
        "Empty ClamAV response".to_string()
    } else {
        text.to_string()
    })
}
