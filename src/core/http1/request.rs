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

use crate::core::buffer::LimitedBuffer;
use std::io;
use std::io::Write;

pub const REQUEST_SIZE_MAX: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request exceeds {} bytes", REQUEST_SIZE_MAX)]
    RequestTooLarge,

    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
}

fn check_value(name: &'static str, value: &str, allow_empty: bool) -> Result<(), RequestError> {
    if (!allow_empty && value.is_empty()) || value.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(RequestError::InvalidValue(name));
    }

    Ok(())
}

fn write_request<W: Write>(
    w: &mut W,
    path: &str,
    host: &str,
    user_agent: Option<&str>,
) -> Result<(), io::Error> {
    write!(w, "GET {} HTTP/1.1\r\n", path)?;
    write!(w, "Host: {}\r\n", host)?;

    if let Some(ua) = user_agent {
        write!(w, "User-Agent: {}\r\n", ua)?;
    }

    write!(w, "\r\n")
}

/// Builds a GET request for `path` with a `Host` header and an optional
/// `User-Agent` header.
pub fn build_request(
    path: &str,
    host: &str,
    user_agent: Option<&str>,
) -> Result<Vec<u8>, RequestError> {
    check_value("path", path, false)?;
    check_value("host", host, false)?;

    if let Some(ua) = user_agent {
        check_value("user agent", ua, true)?;
    }

    if path.contains(' ') {
        return Err(RequestError::InvalidValue("path"));
    }

    let mut buf = LimitedBuffer::new(REQUEST_SIZE_MAX);

    // the only possible write error is running out of space
    if write_request(&mut buf, path, host, user_agent).is_err() {
        return Err(RequestError::RequestTooLarge);
    }

    Ok(buf.as_slice().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        struct Test {
            name: &'static str,
            path: &'static str,
            host: &'static str,
            user_agent: Option<&'static str>,
            result: Result<&'static str, &'static str>,
        }

        let tests = [
            Test {
                name: "with-user-agent",
                path: "/",
                host: "example.com",
                user_agent: Some("TFO Support Tester"),
                result: Ok(
                    "GET / HTTP/1.1\r\nHost: example.com\r\nUser-Agent: TFO Support Tester\r\n\r\n",
                ),
            },
            Test {
                name: "without-user-agent",
                path: "/index.html",
                host: "example.com:8080",
                user_agent: None,
                result: Ok("GET /index.html HTTP/1.1\r\nHost: example.com:8080\r\n\r\n"),
            },
            Test {
                name: "empty-path",
                path: "",
                host: "example.com",
                user_agent: None,
                result: Err("invalid value for path"),
            },
            Test {
                name: "path-with-space",
                path: "/a b",
                host: "example.com",
                user_agent: None,
                result: Err("invalid value for path"),
            },
            Test {
                name: "header-injection",
                path: "/",
                host: "example.com\r\nX-Foo: bar",
                user_agent: None,
                result: Err("invalid value for host"),
            },
            Test {
                name: "user-agent-newline",
                path: "/",
                host: "example.com",
                user_agent: Some("a\nb"),
                result: Err("invalid value for user agent"),
            },
        ];

        for test in tests.iter() {
            let r = build_request(test.path, test.host, test.user_agent);

            match &test.result {
                Ok(expected) => {
                    let data = r.unwrap();
                    assert_eq!(
                        std::str::from_utf8(&data).unwrap(),
                        *expected,
                        "test={}",
                        test.name
                    );
                }
                Err(expected) => {
                    let e = r.unwrap_err();
                    assert_eq!(e.to_string(), *expected, "test={}", test.name);
                }
            }
        }
    }

    #[test]
    fn test_request_too_large() {
        let path = format!("/{}", "a".repeat(REQUEST_SIZE_MAX));

        let e = build_request(&path, "example.com", None).unwrap_err();
        assert!(matches!(e, RequestError::RequestTooLarge));

        // exactly at the limit is fine
        let overhead = "GET  HTTP/1.1\r\nHost: x\r\n\r\n".len();
        let path = format!("/{}", "a".repeat(REQUEST_SIZE_MAX - overhead - 1));

        let data = build_request(&path, "x", None).unwrap();
        assert_eq!(data.len(), REQUEST_SIZE_MAX);
    }
}
