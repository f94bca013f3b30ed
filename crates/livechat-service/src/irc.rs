//! Line-oriented transport to the Twitch chat server, optionally through a
//! SOCKS5 proxy taken from `SOCKS5_PROXY` / `ALL_PROXY`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

use livechat::{ChatError, ChatResult};

pub const TWITCH_IRC_HOST: &str = "irc.chat.twitch.tv";
pub const TWITCH_IRC_PORT: u16 = 6667;

const SOCKS_PROXY_ENV: &str = "SOCKS5_PROXY";
const ALL_PROXY_ENV: &str = "ALL_PROXY";

#[async_trait]
pub trait IrcConnection: Send {
    /// Next line without its terminator, `None` once the server hangs up.
    async fn next_line(&mut self) -> ChatResult<Option<String>>;

    async fn send_line(&mut self, line: &str) -> ChatResult<()>;
}

#[async_trait]
pub trait TwitchChatConnector: Send + Sync {
    async fn connect(&self) -> ChatResult<Box<dyn IrcConnection>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAddr {
    pub host: String,
    pub port: u16,
}

/// Accepts `host:port` or `socks5://host:port`; any other scheme is ignored.
pub fn parse_proxy_addr(raw: &str) -> Option<ProxyAddr> {
    let trimmed = raw.trim();
    let address = match trimmed.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("socks5") => rest,
        Some(_) => return None,
        None => trimmed,
    };
    let (host, port) = address.trim_end_matches('/').rsplit_once(':')?;
    let host = host.trim();
    if host.is_empty() {
        return None;
    }
    Some(ProxyAddr {
        host: host.to_string(),
        port: port.trim().parse().ok()?,
    })
}

#[derive(Debug, Clone)]
pub struct TcpIrcConnector {
    host: String,
    port: u16,
    proxy: Option<ProxyAddr>,
}

impl TcpIrcConnector {
    pub fn new(host: impl Into<String>, port: u16, proxy: Option<ProxyAddr>) -> Self {
        Self {
            host: host.into(),
            port,
            proxy,
        }
    }

    pub fn from_env() -> Self {
        let proxy = std::env::var(SOCKS_PROXY_ENV)
            .or_else(|_| std::env::var(ALL_PROXY_ENV))
            .ok()
            .and_then(|raw| parse_proxy_addr(&raw));
        Self::new(TWITCH_IRC_HOST, TWITCH_IRC_PORT, proxy)
    }

    async fn open(&self) -> Result<TcpStream> {
        match &self.proxy {
            Some(proxy) => {
                info!(target: "livechat::twitch", proxy = %format!("{}:{}", proxy.host, proxy.port), "connecting to chat via socks proxy");
                let mut stream = TcpStream::connect((proxy.host.as_str(), proxy.port))
                    .await
                    .with_context(|| format!("failed to connect to socks proxy {}:{}", proxy.host, proxy.port))?;
                socks5_connect(&mut stream, &self.host, self.port).await?;
                Ok(stream)
            }
            None => {
                let stream = TcpStream::connect((self.host.as_str(), self.port))
                    .await
                    .with_context(|| format!("failed to connect to {}:{}", self.host, self.port))?;
                info!(target: "livechat::twitch", host = %self.host, "connected to chat server");
                Ok(stream)
            }
        }
    }
}

#[async_trait]
impl TwitchChatConnector for TcpIrcConnector {
    async fn connect(&self) -> ChatResult<Box<dyn IrcConnection>> {
        let stream = self
            .open()
            .await
            .map_err(|err| ChatError::Connection(format!("{err:#}")))?;
        Ok(Box::new(TcpIrcConnection::new(stream)))
    }
}

pub struct TcpIrcConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TcpIrcConnection {
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }
}

#[async_trait]
impl IrcConnection for TcpIrcConnection {
    async fn next_line(&mut self) -> ChatResult<Option<String>> {
        self.lines
            .next_line()
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))
    }

    async fn send_line(&mut self, line: &str) -> ChatResult<()> {
        if line.starts_with("PASS ") {
            debug!(target: "livechat::twitch", "> PASS ***");
        } else {
            debug!(target: "livechat::twitch", "> {line}");
        }
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .map_err(|err| ChatError::Transport(err.to_string()))
    }
}

/// No-auth SOCKS5 CONNECT to `host:port` by domain name.
async fn socks5_connect(stream: &mut TcpStream, host: &str, port: u16) -> Result<()> {
    stream.write_all(&[0x05, 0x01, 0x00]).await?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice != [0x05, 0x00] {
        bail!("socks proxy does not accept unauthenticated clients");
    }

    let host_bytes = host.as_bytes();
    let Ok(host_len) = u8::try_from(host_bytes.len()) else {
        bail!("host name too long for socks: {host}");
    };
    let mut request = vec![0x05, 0x01, 0x00, 0x03, host_len];
    request.extend_from_slice(host_bytes);
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[1] != 0x00 {
        bail!("socks proxy rejected connect (code {})", head[1]);
    }
    let bound_len = match head[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            usize::from(len[0])
        }
        other => bail!("unexpected address type {other} in socks reply"),
    };
    // bound address and port are not needed
    let mut bound = vec![0u8; bound_len + 2];
    stream.read_exact(&mut bound).await?;
    info!(target: "livechat::twitch", %host, "socks tunnel established");
    Ok(())
}
