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

use crate::probe::{Config, Strategy, SummaryFormat, DEFAULT_USER_AGENT, RESPONSE_BUF_SIZE};
use clap::{ArgAction, Parser};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Clone)]
#[command(
    name = "tcploader",
    version,
    about = "Fetch a page with a single HTTP/1.1 request, optionally using TCP Fast Open."
)]
pub struct CliArgs {
    #[arg(value_name = "protocol", help = "Service to connect to (http, https or a port).")]
    pub protocol: String,

    #[arg(value_name = "host", help = "Host to connect to, with an optional port.")]
    pub host: String,

    #[arg(value_name = "path", help = "Path to request.")]
    pub path: String,

    #[arg(
        value_name = "user-agent",
        help = "User agent to send (default: \"TFO Support Tester\")."
    )]
    pub user_agent: Option<String>,

    #[arg(long, action=ArgAction::SetTrue, help = "Connect, then send, without Fast Open.")]
    pub plain: bool,

    #[arg(
        long,
        value_name = "bytes",
        help = "Maximum response size (default: 512000)."
    )]
    pub buffer_size: Option<usize>,

    #[arg(long, value_name = "secs", help = "Timeout for connecting and each read or write.")]
    pub timeout: Option<f64>,

    #[arg(long, action=ArgAction::SetTrue, help = "Omit the size field from the summary.")]
    pub legacy_summary: bool,

    #[arg(long, action=ArgAction::SetTrue, help = "Include the server address in the summary.")]
    pub report_server: bool,

    #[arg(long, value_name = "file", help = "File to log to.")]
    pub logfile: Option<PathBuf>,

    #[arg(
        long,
        value_name = "x",
        default_value = "2",
        help = "Log level (default: 2)."
    )]
    pub loglevel: Option<String>,

    #[arg(long, action=ArgAction::SetTrue, help = "Verbose output. Same as --loglevel=3.")]
    pub verbose: bool,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ArgsData {
    pub config: Config,
    pub log_file: Option<PathBuf>,
    pub log_level: u8,
}

impl ArgsData {
    pub fn new(cli_args: CliArgs) -> Result<Self, Box<dyn Error>> {
        let strategy = if cli_args.plain {
            Strategy::Plain
        } else {
            Strategy::FastOpen
        };

        let config = Config {
            service: cli_args.protocol,
            host: cli_args.host,
            path: cli_args.path,
            user_agent: Some(
                cli_args
                    .user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            ),
            strategy,
            buffer_size: Self::get_buffer_size(cli_args.buffer_size)?,
            timeout: Self::get_timeout(cli_args.timeout)?,
            summary_format: SummaryFormat {
                size: !cli_args.legacy_summary,
                server: cli_args.report_server,
            },
        };

        Ok(Self {
            config,
            log_file: cli_args.logfile,
            log_level: Self::get_log_level(cli_args.loglevel.as_deref(), cli_args.verbose)?,
        })
    }

    fn get_buffer_size(size: Option<usize>) -> Result<usize, Box<dyn Error>> {
        match size {
            Some(0) => Err("buffer size must be greater than 0".into()),
            Some(x) => Ok(x),
            None => Ok(RESPONSE_BUF_SIZE),
        }
    }

    fn get_timeout(timeout: Option<f64>) -> Result<Option<Duration>, Box<dyn Error>> {
        let secs = match timeout {
            Some(x) => x,
            None => return Ok(None),
        };

        if !secs.is_finite() || secs <= 0.0 {
            return Err("timeout must be greater than 0".into());
        }

        Ok(Some(Duration::from_secs_f64(secs)))
    }

    fn get_log_level(level: Option<&str>, verbose: bool) -> Result<u8, Box<dyn Error>> {
        if verbose {
            return Ok(3);
        }

        match level {
            Some(x) => match x.trim().parse() {
                Ok(x) => Ok(x),
                Err(_) => Err("log level must be greater than or equal to 0".into()),
            },
            // default log level imposed
            None => Ok(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CliTestArgs {
        name: &'static str,
        input: CliArgs,
        output: Result<ArgsData, &'static str>,
    }

    fn default_args() -> CliArgs {
        CliArgs {
            protocol: String::from("http"),
            host: String::from("example.com"),
            path: String::from("/"),
            user_agent: None,
            plain: false,
            buffer_size: None,
            timeout: None,
            legacy_summary: false,
            report_server: false,
            logfile: None,
            loglevel: None,
            verbose: false,
        }
    }

    fn default_config() -> Config {
        Config::new("http", "example.com", "/")
    }

    #[test]
    fn cli_it_works() {
        let test_args: Vec<CliTestArgs> = vec![
            CliTestArgs {
                name: "positional only",
                input: default_args(),
                output: Ok(ArgsData {
                    config: default_config(),
                    log_file: None,
                    log_level: 2,
                }),
            },
            CliTestArgs {
                name: "all options",
                input: CliArgs {
                    protocol: String::from("8080"),
                    host: String::from("localhost"),
                    path: String::from("/index.html"),
                    user_agent: Some(String::from("curl/8.0")),
                    plain: true,
                    buffer_size: Some(1024),
                    timeout: Some(2.5),
                    legacy_summary: true,
                    report_server: true,
                    logfile: Some(PathBuf::from("/log/path")),
                    loglevel: Some(String::from("4")),
                    verbose: false,
                },
                output: Ok(ArgsData {
                    config: Config {
                        service: String::from("8080"),
                        host: String::from("localhost"),
                        path: String::from("/index.html"),
                        user_agent: Some(String::from("curl/8.0")),
                        strategy: Strategy::Plain,
                        buffer_size: 1024,
                        timeout: Some(Duration::from_millis(2500)),
                        summary_format: SummaryFormat {
                            size: false,
                            server: true,
                        },
                    },
                    log_file: Some(PathBuf::from("/log/path")),
                    log_level: 4,
                }),
            },
            CliTestArgs {
                name: "verbose",
                input: CliArgs {
                    loglevel: Some(String::from("1")),
                    verbose: true,
                    ..default_args()
                },
                output: Ok(ArgsData {
                    config: default_config(),
                    log_file: None,
                    log_level: 3,
                }),
            },
            CliTestArgs {
                name: "zero buffer size",
                input: CliArgs {
                    buffer_size: Some(0),
                    ..default_args()
                },
                output: Err("buffer size must be greater than 0"),
            },
            CliTestArgs {
                name: "zero timeout",
                input: CliArgs {
                    timeout: Some(0.0),
                    ..default_args()
                },
                output: Err("timeout must be greater than 0"),
            },
            CliTestArgs {
                name: "neg log level",
                input: CliArgs {
                    loglevel: Some(String::from("-2")),
                    ..default_args()
                },
                output: Err("log level must be greater than or equal to 0"),
            },
        ];

        for test_arg in test_args {
            let ret = ArgsData::new(test_arg.input);

            match test_arg.output {
                Ok(expected) => assert_eq!(ret.unwrap(), expected, "{}", test_arg.name),
                Err(expected) => {
                    assert_eq!(ret.unwrap_err().to_string(), expected, "{}", test_arg.name)
                }
            }
        }
    }

    #[test]
    fn cli_parse() {
        let args = CliArgs::try_parse_from([
            "tcploader",
            "http",
            "example.com",
            "/",
            "my agent",
            "--plain",
            "--report-server",
        ])
        .unwrap();

        let data = ArgsData::new(args).unwrap();

        assert_eq!(data.config.user_agent.as_deref(), Some("my agent"));
        assert_eq!(data.config.strategy, Strategy::Plain);
        assert!(data.config.summary_format.server);
        assert_eq!(data.log_level, 2);

        assert!(CliArgs::try_parse_from(["tcploader", "http", "example.com"]).is_err());
    }
}
