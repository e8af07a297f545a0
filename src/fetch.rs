//! Single-request fetch worker.
//!
//! A fetch moves through `resolve protocol → connect → request → (redirect →
//! connect)* → stream → verify → done`, any step being able to fail. Each
//! failure is a [`FetchError`]; the caller turns it into an error result.

use std::io::{Cursor, Seek};
use std::sync::Arc;

use futures::TryStreamExt;
use reqwest::header::LOCATION;
use reqwest::{Client, Response, Url};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

use crate::checksum::Checksum;
use crate::config::{Delivery, FetchConfig};
use crate::error::FetchError;
use crate::fs::{FileSystem, extension_suffix};
use crate::outcome::DownloadResult;
use crate::progress::ProgressSnapshot;
use crate::request::Request;

/// Everything a worker needs besides its request.
#[derive(Clone)]
pub struct FetchContext {
    pub client: Client,
    pub config: Arc<FetchConfig>,
    pub fs: Arc<dyn FileSystem>,
    pub delivery: Delivery,
}

/// Builds the HTTP client shared by all workers of a download center.
///
/// Redirects are disabled so the worker can follow them itself with its own
/// hop limit and protocol check.
pub(crate) fn build_client(config: &FetchConfig) -> crate::Result<Client> {
    let mut builder = Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(config.user_agent.clone())
        .tls_built_in_root_certs(true);

    if let Some(path) = &config.ca_bundle {
        let pem = std::fs::read(path).map_err(|e| crate::Error::Certificate {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let certs =
            reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| crate::Error::Certificate {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        if certs.is_empty() {
            return Err(crate::Error::Certificate {
                path: path.display().to_string(),
                reason: "no certificates found".into(),
            });
        }
        log::debug!("Trusting {} extra certificate(s) from {}", certs.len(), path.display());
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    Ok(builder.build()?)
}

/// Runs one request to its terminal state.
///
/// `on_progress` receives the initial snapshot before any byte is read and one
/// snapshot per block afterwards.
pub async fn fetch<P>(ctx: &FetchContext, request: &Request, mut on_progress: P) -> DownloadResult
where
    P: FnMut(ProgressSnapshot) + Send,
{
    match run(ctx, request, &mut on_progress).await {
        Ok(result) => {
            log::debug!("{}: done", request.url);
            result
        }
        Err(e) => {
            log::warn!("{}: {e}", request.url);
            DownloadResult::Error(e.to_string())
        }
    }
}

async fn run<P>(
    ctx: &FetchContext,
    request: &Request,
    on_progress: &mut P,
) -> Result<DownloadResult, FetchError>
where
    P: FnMut(ProgressSnapshot) + Send,
{
    let response = connect(ctx, &request.url).await?;

    let size = response.content_length();
    let mut sink = Sink::open(ctx, &request.url).await?;
    let mut hasher = request.checksum.as_ref().map(Checksum::hasher);

    log::debug!("{}: streaming ({size:?} bytes announced)", request.url);
    on_progress(ProgressSnapshot { size, current: 0 });

    let body = response.bytes_stream().map_err(std::io::Error::other);
    let reader = StreamReader::new(body);
    tokio::pin!(reader);
    let mut block = vec![0u8; ctx.config.block_size];
    let mut current = 0u64;

    loop {
        let len = read_block(&mut reader, &mut block)
            .await
            .map_err(|e| FetchError::ConnectionFailed(format!("transfer interrupted: {e}")))?;
        if len == 0 {
            break;
        }
        let chunk = &block[..len];
        sink.write(chunk).await?;
        if let Some(hasher) = hasher.as_mut() {
            hasher.update(chunk);
        }
        current += len as u64;
        on_progress(ProgressSnapshot { size, current });
    }

    if let (Some(checksum), Some(hasher)) = (&request.checksum, hasher) {
        let actual = hasher.finalize_hex();
        if !checksum.matches(&actual) {
            return Err(FetchError::ChecksumMismatch {
                expected: checksum.expected().to_string(),
                actual,
            });
        }
        log::debug!("{}: {} verified", request.url, checksum.algorithm());
    }

    Ok(sink.finish().await?)
}

/// Resolves the protocol and follows redirects until a 2xx response.
async fn connect(ctx: &FetchContext, url: &str) -> Result<Response, FetchError> {
    let mut target = parse_url(url)?;
    let mut hops = 0;

    loop {
        log::debug!("{url}: requesting {target}");
        let response = ctx
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(|e| FetchError::from_transport(&e))?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok());
        match location {
            Some(location) if status.is_redirection() => {
                if hops >= ctx.config.max_redirects {
                    return Err(FetchError::TooManyRedirects(ctx.config.max_redirects));
                }
                hops += 1;
                let next = target
                    .join(location)
                    .map_err(|e| FetchError::InvalidUrl(format!("{location}: {e}")))?;
                check_scheme(&next)?;
                log::debug!("{url}: redirect {hops} ({status}) to {next}");
                target = next;
            }
            _ => return Err(FetchError::from_status(status)),
        }
    }
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;
    check_scheme(&parsed)?;
    Ok(parsed)
}

fn check_scheme(url: &Url) -> Result<(), FetchError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(FetchError::ProtocolUnsupported(other.to_string())),
    }
}

/// Fills `block` completely unless the stream ends first.
///
/// Returns the number of bytes placed in `block`; 0 means end of stream.
async fn read_block<R>(reader: &mut R, block: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < block.len() {
        let n = reader.read(&mut block[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Destination exclusively owned by one worker until delivery.
enum Sink {
    File {
        temp: NamedTempFile,
        writer: tokio::fs::File,
    },
    Memory(Vec<u8>),
}

impl Sink {
    async fn open(ctx: &FetchContext, url: &str) -> std::io::Result<Self> {
        match ctx.delivery {
            Delivery::TempFile => {
                let temp = ctx.fs.create_temp_file(&extension_suffix(url)).await?;
                let writer = tokio::fs::File::from_std(temp.reopen()?);
                Ok(Self::File { temp, writer })
            }
            Delivery::Memory => Ok(Self::Memory(Vec::new())),
        }
    }

    async fn write(&mut self, chunk: &[u8]) -> std::io::Result<()> {
        match self {
            Self::File { writer, .. } => writer.write_all(chunk).await,
            Self::Memory(buffer) => {
                buffer.extend_from_slice(chunk);
                Ok(())
            }
        }
    }

    /// Flushes and rewinds the destination and wraps it as a result.
    async fn finish(self) -> std::io::Result<DownloadResult> {
        match self {
            Self::File { mut temp, mut writer } => {
                writer.flush().await?;
                drop(writer);
                temp.as_file_mut().rewind()?;
                Ok(DownloadResult::File(temp))
            }
            Self::Memory(buffer) => Ok(DownloadResult::Buffer(Cursor::new(buffer))),
        }
    }
}
