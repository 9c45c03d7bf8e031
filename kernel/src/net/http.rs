// Minimal HTTP/1.1 byte-range client
//
// One request per connection: `GET path` with `Range: bytes=a-b` and
// `Connection: close`. The response must be 206, or 200 when the range
// starts at 0 (servers that ignore Range send the file from the start).
// The body must fill the destination completely or the fetch fails;
// a short page is never installed.
//
// Works over anything implementing embedded-io-async Read + Write;
// the firmware hands it an embassy-net TcpSocket.

use core::fmt::Write as FmtWrite;

use embedded_io_async::{Read, Write};
use log::debug;

use crate::error::FetchError;

// status line + headers must fit here
const HEADER_BUF: usize = 512;
const REQUEST_BUF: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Url<'a> {
    pub host: &'a str,
    pub port: u16,
    pub path: &'a str,
}

/// Split `http://host[:port]/path`. `https` is refused: no TLS here.
pub fn parse_url(url: &str) -> Result<Url<'_>, FetchError> {
    let rest = match url.strip_prefix("http://") {
        Some(rest) => rest,
        None if url.starts_with("https://") => return Err(FetchError::UnsupportedScheme),
        None => return Err(FetchError::InvalidUrl),
    };
    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().map_err(|_| FetchError::InvalidUrl)?),
        None => (authority, 80),
    };
    if host.is_empty() {
        return Err(FetchError::InvalidUrl);
    }
    Ok(Url { host, port, path })
}

/// Send the range request for `len` bytes at `offset`.
pub async fn write_range_request<W: Write>(
    w: &mut W,
    url: &Url<'_>,
    offset: u64,
    len: usize,
) -> Result<(), FetchError> {
    if len == 0 {
        return Err(FetchError::InvalidUrl);
    }
    let last = offset + len as u64 - 1;
    let mut buf = [0u8; REQUEST_BUF];
    let n = stack_fmt(&mut buf, |s| {
        write!(s, "GET {} HTTP/1.1\r\nHost: {}", url.path, url.host)?;
        // HTTP/1.1 wants the port in Host unless it is the default
        if url.port != 80 {
            write!(s, ":{}", url.port)?;
        }
        write!(
            s,
            "\r\nRange: bytes={}-{}\r\nConnection: close\r\n\r\n",
            offset, last
        )
    })?;
    w.write_all(&buf[..n]).await.map_err(|_| FetchError::Io)?;
    w.flush().await.map_err(|_| FetchError::Io)
}

/// Read the response to a range request into `dest`.
pub async fn read_range_response<R: Read>(
    r: &mut R,
    offset: u64,
    dest: &mut [u8],
) -> Result<(), FetchError> {
    let mut hdr = [0u8; HEADER_BUF];
    let mut pos = 0usize;
    let body_start = loop {
        if pos >= hdr.len() {
            return Err(FetchError::MalformedResponse);
        }
        let n = r.read(&mut hdr[pos..]).await.map_err(|_| FetchError::Io)?;
        if n == 0 {
            return Err(FetchError::MalformedResponse);
        }
        pos += n;
        if let Some(i) = find_header_end(&hdr[..pos]) {
            break i;
        }
    };

    let status = parse_status(&hdr[..body_start])?;
    let accepted = status == 206 || (status == 200 && offset == 0);
    if !accepted {
        return Err(FetchError::Status(status));
    }
    debug!("http: status {}, reading {} bytes", status, dest.len());

    // body bytes that arrived with the headers
    let early = &hdr[body_start..pos];
    let take = early.len().min(dest.len());
    dest[..take].copy_from_slice(&early[..take]);

    let mut filled = take;
    while filled < dest.len() {
        let n = r
            .read(&mut dest[filled..])
            .await
            .map_err(|_| FetchError::Io)?;
        if n == 0 {
            return Err(FetchError::ShortBody {
                expected: dest.len(),
                received: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Request and read one byte range over an open connection.
pub async fn fetch_range<S: Read + Write>(
    stream: &mut S,
    url: &Url<'_>,
    offset: u64,
    dest: &mut [u8],
) -> Result<(), FetchError> {
    write_range_request(stream, url, offset, dest.len()).await?;
    read_range_response(stream, offset, dest).await
}

// index just past "\r\n\r\n"
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

// "HTTP/1.1 206 Partial Content\r\n..."
fn parse_status(head: &[u8]) -> Result<u16, FetchError> {
    let line_end = head
        .windows(2)
        .position(|w| w == b"\r\n")
        .ok_or(FetchError::MalformedResponse)?;
    let line = core::str::from_utf8(&head[..line_end]).map_err(|_| FetchError::MalformedResponse)?;
    let mut parts = line.split(' ');
    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/1.") {
        return Err(FetchError::MalformedResponse);
    }
    parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or(FetchError::MalformedResponse)
}

// ── Stack-based fmt helper ──────────────────────────────────────────

/// Format into a stack buffer; fails if it does not fit.
fn stack_fmt(
    buf: &mut [u8],
    f: impl FnOnce(&mut StackWriter<'_>) -> core::fmt::Result,
) -> Result<usize, FetchError> {
    let mut w = StackWriter { buf, pos: 0 };
    f(&mut w).map_err(|_| FetchError::InvalidUrl)?;
    Ok(w.pos)
}

struct StackWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl core::fmt::Write for StackWriter<'_> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let room = self.buf.len() - self.pos;
        if bytes.len() > room {
            return Err(core::fmt::Error);
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }
}
