/*
 * Copyright (C) 2024 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use log::{debug, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::io::{Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("error connecting: {0}")]
    Connect(io::Error),

    #[error("error sending: {0}")]
    Send(io::Error),
}

// names are limited to the web services. anything else, including other
// entries of the system services database, must be given as a port number
pub fn service_port(service: &str) -> Option<u16> {
    match service {
        "http" => Some(80),
        "https" => Some(443),
        s => s.parse().ok(),
    }
}

// return (host, port). the host may carry its own port, as in a URL
// authority. bracketed IPv6 literals are unwrapped
pub fn split_authority(authority: &str) -> (&str, Option<&str>) {
    if let Some(rest) = authority.strip_prefix('[') {
        return match rest.find(']') {
            Some(pos) => {
                let port = rest[(pos + 1)..].strip_prefix(':');

                (&rest[..pos], port)
            }
            None => (authority, None),
        };
    }

    match authority.find(':') {
        // more than one colon means a bare IPv6 address
        Some(pos) if authority[(pos + 1)..].find(':').is_none() => {
            (&authority[..pos], Some(&authority[(pos + 1)..]))
        }
        _ => (authority, None),
    }
}

/// Resolves `host` to a single address, preferring IPv4.
///
/// `service` is a port number or `http`/`https`. A port included in `host`
/// takes precedence.
pub fn resolve(host: &str, service: &str) -> Result<SocketAddr, io::Error> {
    let (name, port) = split_authority(host);

    let port = match port {
        Some(port) => match port.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("invalid port: {}", port),
                ))
            }
        },
        None => match service_port(service) {
            Some(port) => port,
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unknown service: {}", service),
                ))
            }
        },
    };

    if name.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty host"));
    }

    let addrs: Vec<SocketAddr> = (name, port).to_socket_addrs()?.collect();

    debug!("{} resolved to {:?}", name, addrs);

    match addrs.iter().find(|addr| addr.is_ipv4()).or_else(|| addrs.first()) {
        Some(addr) => Ok(*addr),
        None => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {}", name),
        )),
    }
}

pub trait Connection: Read {
    fn fast_open_used(&self) -> bool;
}

/// How a connection is established and the request delivered.
pub trait Opener {
    type Conn: Connection;

    fn open(&self, addr: SocketAddr, data: &[u8]) -> Result<Self::Conn, OpenError>;
}

pub struct TcpConnection {
    socket: Socket,
    fast_open_used: bool,
}

impl Read for TcpConnection {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        self.socket.read(buf)
    }
}

impl Connection for TcpConnection {
    fn fast_open_used(&self) -> bool {
        self.fast_open_used
    }
}

fn new_socket(addr: SocketAddr, timeout: Option<Duration>) -> Result<Socket, io::Error> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_read_timeout(timeout)?;
    socket.set_write_timeout(timeout)?;

    Ok(socket)
}

fn connect_and_send(
    addr: SocketAddr,
    data: &[u8],
    timeout: Option<Duration>,
) -> Result<TcpConnection, OpenError> {
    let mut socket = new_socket(addr, timeout).map_err(OpenError::Connect)?;

    let sa = SockAddr::from(addr);

    let ret = match timeout {
        Some(timeout) => socket.connect_timeout(&sa, timeout),
        None => socket.connect(&sa),
    };

    ret.map_err(OpenError::Connect)?;

    socket.write_all(data).map_err(OpenError::Send)?;

    Ok(TcpConnection {
        socket,
        fast_open_used: false,
    })
}

/// Connect, then send.
pub struct PlainOpener {
    timeout: Option<Duration>,
}

impl PlainOpener {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Opener for PlainOpener {
    type Conn = TcpConnection;

    fn open(&self, addr: SocketAddr, data: &[u8]) -> Result<Self::Conn, OpenError> {
        connect_and_send(addr, data, self.timeout)
    }
}

/// Send the request with the SYN, using TCP Fast Open.
///
/// If the kernel has no cookie for the server yet, or the server doesn't
/// support Fast Open, the kernel falls back to a normal handshake and
/// `fast_open_used` reports false.
pub struct FastOpenOpener {
    timeout: Option<Duration>,
}

impl FastOpenOpener {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[cfg(target_os = "linux")]
mod fastopen {
    use super::*;
    use std::mem;
    use std::os::unix::io::AsRawFd;

    // from linux/tcp.h
    const TCPI_OPT_SYN_DATA: u8 = 32;

    // sendto performs the handshake, so errors from it may belong to
    // either phase
    pub fn is_connect_error(e: &io::Error) -> bool {
        match e.raw_os_error() {
            Some(code) => matches!(
                code,
                libc::ECONNREFUSED
                    | libc::ECONNRESET
                    | libc::ETIMEDOUT
                    | libc::EINPROGRESS
                    | libc::EHOSTUNREACH
                    | libc::ENETUNREACH
                    | libc::ENETDOWN
                    | libc::EADDRNOTAVAIL
            ),
            None => matches!(
                e.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut
            ),
        }
    }

    pub fn open(
        addr: SocketAddr,
        data: &[u8],
        timeout: Option<Duration>,
    ) -> Result<TcpConnection, OpenError> {
        let mut socket = new_socket(addr, timeout).map_err(OpenError::Connect)?;

        let sa = SockAddr::from(addr);

        // connects and sends in one call
        let size = match socket.send_to_with_flags(data, &sa, libc::MSG_FASTOPEN) {
            Ok(size) => size,
            Err(e) if e.raw_os_error() == Some(libc::EOPNOTSUPP) => {
                warn!("fast open is disabled in the kernel. using plain connect");

                return connect_and_send(addr, data, timeout);
            }
            Err(e) if is_connect_error(&e) => return Err(OpenError::Connect(e)),
            Err(e) => return Err(OpenError::Send(e)),
        };

        if size < data.len() {
            socket.write_all(&data[size..]).map_err(OpenError::Send)?;
        }

        let fast_open_used = match syn_data_acked(&socket) {
            Ok(b) => b,
            Err(e) => {
                warn!("unable to query fast open status: {}", e);

                false
            }
        };

        Ok(TcpConnection {
            socket,
            fast_open_used,
        })
    }

    pub fn syn_data_acked(socket: &Socket) -> Result<bool, io::Error> {
        // SAFETY: tcp_info is plain old data
        let mut info: libc::tcp_info = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::tcp_info>() as libc::socklen_t;

        // SAFETY: info and len are valid for writes and len holds the size
        // of info
        let ret = unsafe {
            libc::getsockopt(
                socket.as_raw_fd(),
                libc::IPPROTO_TCP,
                libc::TCP_INFO,
                &mut info as *mut libc::tcp_info as *mut libc::c_void,
                &mut len,
            )
        };

        if ret != 0 {
            return Err(io::Error::last_os_error());
        }

        debug!("tcp_info options: {:#x}", info.tcpi_options);

        Ok(info.tcpi_options & TCPI_OPT_SYN_DATA != 0)
    }
}

impl Opener for FastOpenOpener {
    type Conn = TcpConnection;

    #[cfg(target_os = "linux")]
    fn open(&self, addr: SocketAddr, data: &[u8]) -> Result<Self::Conn, OpenError> {
        fastopen::open(addr, data, self.timeout)
    }

    #[cfg(not(target_os = "linux"))]
    fn open(&self, addr: SocketAddr, data: &[u8]) -> Result<Self::Conn, OpenError> {
        warn!("fast open not supported on this platform. using plain connect");

        connect_and_send(addr, data, self.timeout)
    }
}
