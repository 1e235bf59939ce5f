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

//! Issues one GET request and measures how long the response takes.

use crate::core::http1::accumulator::{FeedStatus, FramingError, ResponseAccumulator, Totals};
use crate::core::http1::request::{build_request, RequestError};
use crate::core::http1::response::{parse_status, Status};
use crate::core::net::{self, Connection, FastOpenOpener, OpenError, Opener, PlainOpener};
use log::{debug, info, warn};
use std::io;
use std::io::Read;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub const RESPONSE_BUF_SIZE: usize = 500 * 1024;
pub const READ_CHUNK_SIZE: usize = 16_384;
pub const DEFAULT_USER_AGENT: &str = "TFO Support Tester";

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Strategy {
    Plain,
    FastOpen,
}

/// Which optional fields appear in the summary line.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SummaryFormat {
    pub size: bool,
    pub server: bool,
}

impl Default for SummaryFormat {
    fn default() -> Self {
        Self {
            size: true,
            server: false,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Config {
    pub service: String,
    pub host: String,
    pub path: String,
    pub user_agent: Option<String>,
    pub strategy: Strategy,
    pub buffer_size: usize,
    pub timeout: Option<Duration>,
    pub summary_format: SummaryFormat,
}

impl Config {
    pub fn new(service: &str, host: &str, path: &str) -> Self {
        Self {
            service: service.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            strategy: Strategy::FastOpen,
            buffer_size: RESPONSE_BUF_SIZE,
            timeout: None,
            summary_format: SummaryFormat::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to resolve {host}: {source}")]
    Resolution { host: String, source: io::Error },

    #[error("error connecting: {0}")]
    Connect(io::Error),

    #[error("error sending: {0}")]
    Send(io::Error),

    #[error("error receiving: {0}")]
    Receive(io::Error),

    #[error("response exceeded buffer size of {capacity} bytes (see --buffer-size)")]
    BufferOverflow { capacity: usize },

    #[error("failed to build request: {0}")]
    Request(#[from] RequestError),
}

impl From<OpenError> for Error {
    fn from(e: OpenError) -> Self {
        match e {
            OpenError::Connect(e) => Self::Connect(e),
            OpenError::Send(e) => Self::Send(e),
        }
    }
}

/// How the receive loop ended.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Completion {
    // all advertised content arrived
    Framed,

    // the peer closed first
    PeerClosed,
}

/// Feeds chunks read from `r` into `acc` until the response is framed or
/// the peer closes the connection.
///
/// Read errors abort without finalizing. A malformed `Content-Length` is
/// logged and the response is then read until the peer closes.
pub fn receive_response<R: Read>(
    r: &mut R,
    acc: &mut ResponseAccumulator,
    chunk_size: usize,
) -> Result<Completion, Error> {
    let mut chunk = vec![0; chunk_size.max(1)];

    loop {
        let size = match r.read(&mut chunk) {
            Ok(size) => size,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Receive(e)),
        };

        if size == 0 {
            debug!("peer closed after {} bytes", acc.total_received());

            return Ok(Completion::PeerClosed);
        }

        match acc.feed(&chunk[..size]) {
            Ok(FeedStatus::Complete) => return Ok(Completion::Framed),
            Ok(FeedStatus::NeedMore) => {}
            Err(FramingError::BufferOverflow { capacity }) => {
                return Err(Error::BufferOverflow { capacity })
            }
            Err(e @ FramingError::MalformedHeader(_)) => {
                warn!("{}. reading until the connection closes", e);
            }
        }
    }
}

#[derive(Debug)]
pub struct Report {
    pub fast_open_used: bool,
    pub elapsed: Duration,
    pub totals: Totals,
    pub server: SocketAddr,
    pub completion: Completion,
    pub status: Option<Status>,
}

impl Report {
    /// The machine-readable result line, e.g.
    /// `tcp_fast_open_used=1;time_seconds=0.052301;size=1256`.
    pub fn summary_line(&self, format: SummaryFormat) -> String {
        let mut out = format!(
            "tcp_fast_open_used={};time_seconds={:.6}",
            self.fast_open_used as u8,
            self.elapsed.as_secs_f64()
        );

        if format.size {
            out.push_str(&format!(";size={}", self.totals.content_bytes));
        }

        if format.server {
            out.push_str(&format!(";server={}", self.server));
        }

        out
    }
}

pub fn run_with<O: Opener>(config: &Config, opener: &O) -> Result<Report, Error> {
    let req = build_request(&config.path, &config.host, config.user_agent.as_deref())?;

    info!(
        "GET {} from {} ({}), {} byte request",
        config.path,
        config.host,
        config.service,
        req.len()
    );

    // timing includes name resolution
    let start = Instant::now();

    let server = match net::resolve(&config.host, &config.service) {
        Ok(addr) => addr,
        Err(e) => {
            return Err(Error::Resolution {
                host: config.host.clone(),
                source: e,
            })
        }
    };

    info!("connecting to {}", server);

    let mut conn = opener.open(server, &req)?;

    let fast_open_used = conn.fast_open_used();

    let mut acc = ResponseAccumulator::new(config.buffer_size);

    debug!("response buffer capacity: {}", acc.capacity());

    let completion = receive_response(&mut conn, &mut acc, READ_CHUNK_SIZE)?;

    let elapsed = start.elapsed();

    // close before reporting
    drop(conn);

    let totals = acc.finalize();

    let status = match acc.head().map(parse_status) {
        Some(Ok(status)) => Some(status),
        Some(Err(e)) => {
            debug!("unable to parse response head: {}", e);

            None
        }
        None => None,
    };

    match &status {
        Some(status) => info!(
            "response {} {}, {} bytes ({} content)",
            status.code, status.reason, totals.total_bytes, totals.content_bytes
        ),
        None => info!(
            "response {} bytes ({} content)",
            totals.total_bytes, totals.content_bytes
        ),
    }

    if completion == Completion::PeerClosed {
        if let Some(size) = acc.content_length() {
            if totals.content_bytes < size {
                warn!(
                    "connection closed early: got {} of {} content bytes",
                    totals.content_bytes, size
                );
            }
        }
    }

    Ok(Report {
        fast_open_used,
        elapsed,
        totals,
        server,
        completion,
        status,
    })
}

pub fn run(config: &Config) -> Result<Report, Error> {
    match config.strategy {
        Strategy::Plain => run_with(config, &PlainOpener::new(config.timeout)),
        Strategy::FastOpen => run_with(config, &FastOpenOpener::new(config.timeout)),
    }
}
