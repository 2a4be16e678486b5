//! Blocking socket helpers.
//!
//! Grounded on the teacher's `SocketAgentSync` (`src/agent/sync_agent.rs`):
//! the same "read into a fixed buffer, stop once framing says so" shape,
//! re-targeted from `UnixStream` to `TcpStream` and from a length-prefixed
//! JSON-RPC framing to HTTP's Content-Length/chunked discipline.
use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::{Domain, Socket, Type};

use crate::error::{Error, Result};
use crate::http::HttpMessage;

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Binds a listening socket on `addr` with address/port reuse enabled
/// and the given `backlog`, per spec.md §6.
pub fn bind_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, None).map_err(Error::SocketInit)?;
    socket.set_reuse_address(true).map_err(Error::SocketInit)?;
    #[cfg(unix)]
    socket.set_reuse_port(true).map_err(Error::SocketInit)?;
    socket.bind(&addr.into()).map_err(Error::SocketInit)?;
    socket.listen(backlog).map_err(Error::SocketInit)?;
    socket.set_nonblocking(true).map_err(Error::SocketInit)?;
    Ok(socket.into())
}

/// Resolves `host` to a connectable address on `port`, ignoring any
/// `:port` suffix already present in `host`. Both the client's `Host`
/// header and the explorer's same-host fetches speak cleartext HTTP on
/// port 80 only, per spec.md §6's non-goals — a client-supplied port
/// is never honored, since doing so would let a client redirect the
/// proxy's origin connection to an arbitrary port.
pub fn resolve_host(host: &str, port: u16) -> Result<SocketAddr> {
    let host_only = host.rsplit_once(':').map_or(host, |(h, _)| h);
    let candidate = format!("{host_only}:{port}");
    candidate
        .to_socket_addrs()
        .map_err(|_| Error::Dns(host.to_string()))?
        .next()
        .ok_or_else(|| Error::Dns(host.to_string()))
}

/// Opens a connection to an origin, applying the engine's fixed read
/// timeout immediately (spec.md §4.2.1).
pub fn connect(addr: SocketAddr, read_timeout: Duration) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).map_err(Error::Connect)?;
    stream.set_read_timeout(Some(read_timeout)).map_err(Error::SocketInit)?;
    Ok(stream)
}

/// Reads one complete HTTP message from `stream` into a buffer of at
/// most `capacity` bytes, applying the length discipline of spec.md
/// §4.2.1:
///
/// 1. `Content-Length: N` present → read until `N` body bytes have
///    arrived.
/// 2. Else `Transfer-Encoding: chunked` → read until the peer closes
///    or errors; chunk framing is preserved verbatim, not parsed.
/// 3. Else → warn and return whatever the header-assembly reads
///    already produced.
pub fn read_framed(stream: &mut TcpStream, capacity: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; capacity];
    let mut len = 0usize;
    let mut header_end: Option<usize> = None;
    let mut content_length: Option<usize> = None;
    let mut chunked = false;

    loop {
        if header_end.is_none() {
            if len >= capacity {
                return Err(Error::BufferFull);
            }
            let n = stream.read(&mut buf[len..]).map_err(Error::Read)?;
            if n == 0 {
                break;
            }
            len += n;
            if let Some(terminator) = find_subslice(&buf[..len], b"\r\n\r\n") {
                header_end = Some(terminator + 4);
                if let Ok(msg) = HttpMessage::parse(&buf[..len]) {
                    content_length = msg.headers.first("Content-Length").and_then(|v| v.trim().parse().ok());
                    chunked = msg
                        .headers
                        .first("Transfer-Encoding")
                        .map(|v| v.eq_ignore_ascii_case("chunked"))
                        .unwrap_or(false);
                }
            }
            continue;
        }

        let end = header_end.expect("checked above");
        if let Some(body_len) = content_length {
            let total = end + body_len;
            if len >= total {
                break;
            }
            if len >= capacity {
                return Err(Error::BufferFull);
            }
            let n = stream.read(&mut buf[len..]).map_err(Error::Read)?;
            if n == 0 {
                break;
            }
            len += n;
        } else if chunked {
            if len >= capacity {
                return Err(Error::BufferFull);
            }
            match stream.read(&mut buf[len..]) {
                Ok(0) => break,
                Ok(n) => len += n,
                Err(e) => return Err(Error::Read(e)),
            }
        } else {
            log::warn!("message has neither Content-Length nor chunked Transfer-Encoding; using what was already read");
            break;
        }
    }

    buf.truncate(len);
    Ok(buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener as StdTcpListener;
    use std::thread;

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (client.join().unwrap(), server)
    }

    #[test]
    fn read_framed_stops_exactly_at_content_length() {
        let (mut client, mut server) = loopback_pair();
        let payload = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        let writer = thread::spawn(move || {
            server.write_all(payload).unwrap();
        });
        let bytes = read_framed(&mut client, 4096).unwrap();
        writer.join().unwrap();
        assert_eq!(bytes, payload);
    }

    #[test]
    fn read_framed_passes_through_chunked_body_verbatim() {
        let (mut client, mut server) = loopback_pair();
        let payload = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nfoo\r\n0\r\n\r\n";
        let writer = thread::spawn(move || {
            server.write_all(payload).unwrap();
            drop(server);
        });
        let bytes = read_framed(&mut client, 4096).unwrap();
        writer.join().unwrap();
        assert_eq!(bytes, payload);
    }

    #[test]
    fn read_framed_accepts_chunked_body_closed_without_terminal_chunk() {
        // spec.md §8: a chunked response closed by the server without ever
        // sending the final 0-length chunk is accepted and returned as received.
        let (mut client, mut server) = loopback_pair();
        let payload = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nfoo\r\n";
        let writer = thread::spawn(move || {
            server.write_all(payload).unwrap();
            drop(server);
        });
        let bytes = read_framed(&mut client, 4096).unwrap();
        writer.join().unwrap();
        assert_eq!(bytes, payload);
    }

    #[test]
    fn read_framed_reports_buffer_full_when_body_overflows() {
        let (mut client, mut server) = loopback_pair();
        let payload = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n0123456789";
        let writer = thread::spawn(move || {
            server.write_all(payload).unwrap();
        });
        let result = read_framed(&mut client, payload.len() - 1);
        writer.join().unwrap();
        assert!(matches!(result, Err(Error::BufferFull)));
    }
}
