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

// some reasonable number
pub const HEADERS_MAX: usize = 64;

#[derive(Debug, PartialEq, Eq)]
pub struct Status {
    pub code: u16,
    pub reason: String,
}

// for display only. framing is done by the accumulator
pub fn parse_status(head: &[u8]) -> Result<Status, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; HEADERS_MAX];

    let mut resp = httparse::Response::new(&mut headers);

    match resp.parse(head)? {
        httparse::Status::Complete(_) => {}
        httparse::Status::Partial => return Err(httparse::Error::Status),
    }

    Ok(Status {
        code: resp.code.unwrap_or(0),
        reason: resp.reason.unwrap_or("").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status() {
        let s = parse_status(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n").unwrap();
        assert_eq!(
            s,
            Status {
                code: 200,
                reason: "OK".to_string()
            }
        );

        let s = parse_status(b"HTTP/1.0 404 Not Found\r\n\r\n").unwrap();
        assert_eq!(s.code, 404);
        assert_eq!(s.reason, "Not Found");

        assert!(parse_status(b"HTTP/1.1 200 OK\r\n").is_err());
        assert!(parse_status(b"garbage\r\n\r\n").is_err());

        let mut head = String::from("HTTP/1.1 200 OK\r\n");
        for i in 0..(HEADERS_MAX + 1) {
            head.push_str(&format!("X-{}: a\r\n", i));
        }
        head.push_str("\r\n");

        assert_eq!(
            parse_status(head.as_bytes()).unwrap_err(),
            httparse::Error::TooManyHeaders
        );
    }
}
