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

use clap::Parser;
use log::error;
use std::error::Error;
use std::process;
use tcploader::cliargs::{ArgsData, CliArgs};
use tcploader::core::log::{
    ensure_init_simple_logger, get_simple_logger, level_filter, local_offset_check, open_log_file,
};
use tcploader::probe;

fn process_args_and_run(args: CliArgs) -> Result<(), Box<dyn Error>> {
    let args_data = ArgsData::new(args)?;

    let mut log_file_error = None;

    let log_file = match &args_data.log_file {
        Some(x) => match open_log_file(x) {
            Ok(x) => Some(x),
            Err(e) => {
                log_file_error = Some(e);
                None
            }
        },
        None => None,
    };

    ensure_init_simple_logger(log_file);
    log::set_logger(get_simple_logger()).map_err(|e| e.to_string())?;
    log::set_max_level(level_filter(args_data.log_level));

    if let Some(e) = log_file_error {
        error!("unable to open log file: {}. logging to standard out.", e);
    }

    local_offset_check();

    let config = &args_data.config;

    let report = probe::run(config)?;

    println!("{}", report.summary_line(config.summary_format));

    Ok(())
}

fn main() {
    let args = CliArgs::parse();

    if let Err(e) = process_args_and_run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
