//! Console front end: runs a Glulx story on stdin/stdout, answering the
//! engine's requests for input and save files.
#[macro_use]
extern crate log;

use std::env;
use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::panic;
use std::process::{exit, ExitCode};

use plugh::config::Config;
use plugh::files;
use plugh::glulx::io::Output;
use plugh::glulx::{Glulx, HostRequest, HostResponse, RequestType};

/// Print the story channel, logging anything else the program emitted.
fn deliver(output: &Output) {
    for (channel, text) in output {
        if channel == "MAIN" {
            print!("{}", text);
            let _ = io::stdout().flush();
        } else {
            debug!(target: "app::stream", "[{}] {}", channel, text);
        }
    }
}

fn read_line(max_len: usize) -> String {
    let mut input = String::new();
    match io::stdin().lock().read_line(&mut input) {
        Ok(_) => {
            let line = input.trim_end_matches(['\r', '\n']);
            line.chars().take(max_len).collect()
        }
        Err(e) => {
            error!(target: "app::trace", "Error reading input: {}", e);
            String::new()
        }
    }
}

fn read_key() -> u32 {
    let mut input = String::new();
    match io::stdin().lock().read_line(&mut input) {
        Ok(_) => input.chars().next().map(|c| c as u32).unwrap_or(0),
        Err(_) => 0,
    }
}

/// Write the save record to the next numbered save file.
fn write_save(name: &str, data: &[u8]) -> bool {
    let filename = match files::first_available(name, "glksave") {
        Ok(f) => f,
        Err(e) => {
            error!(target: "app::trace", "Save failed: {}", e);
            return false;
        }
    };
    if let Err(e) = files::check_filename(&filename) {
        error!(target: "app::trace", "Save failed: {}", e);
        return false;
    }
    match File::create(&filename) {
        Ok(mut f) => match f.write_all(data) {
            Ok(()) => {
                println!("\nSaved to {}", filename);
                true
            }
            Err(e) => {
                error!(target: "app::trace", "Error writing {}: {}", filename, e);
                false
            }
        },
        Err(e) => {
            error!(target: "app::trace", "Error creating {}: {}", filename, e);
            false
        }
    }
}

/// Read the most recent numbered save file.
fn read_save(name: &str) -> Option<Vec<u8>> {
    let filename = files::last_existing(name, "glksave").ok()?;
    match File::open(&filename) {
        Ok(mut f) => {
            let mut data = Vec::new();
            match f.read_to_end(&mut data) {
                Ok(_) => {
                    println!("\nRestoring from {}", filename);
                    Some(data)
                }
                Err(e) => {
                    error!(target: "app::trace", "Error reading {}: {}", filename, e);
                    None
                }
            }
        }
        Err(e) => {
            error!(target: "app::trace", "Error opening {}: {}", filename, e);
            None
        }
    }
}

fn answer(request: &HostRequest, name: &str) -> HostResponse {
    match request.request_type() {
        RequestType::ReadLine => HostResponse::line(&read_line(request.max_len())),
        RequestType::ReadKey => HostResponse::key(read_key()),
        RequestType::Save => HostResponse::save(write_save(name, request.save_data())),
        RequestType::Restore => match read_save(name) {
            Some(data) => HostResponse::restore(&data),
            None => HostResponse::restore_failed(),
        },
    }
}

fn initialize_config() -> Config {
    if let Some(filename) = files::config_file("config.yml") {
        match File::open(&filename) {
            Ok(f) => match Config::from_file(f) {
                Ok(config) => config,
                Err(e) => {
                    info!(target: "app::trace", "Error parsing configuration from {}: {}", filename, e);
                    Config::default()
                }
            },
            Err(e) => {
                info!(target: "app::trace", "Error reading configuration from {}: {}", filename, e);
                Config::default()
            }
        }
    } else {
        Config::default()
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: plugh <story-file>");
        return ExitCode::FAILURE;
    }
    let filename = &args[1];
    let full_name = filename.split('.').collect::<Vec<&str>>()[0].to_string();
    let name = full_name
        .split('/')
        .collect::<Vec<&str>>()
        .last()
        .unwrap()
        .to_string();
    let config = initialize_config();

    if config.logging() {
        if let Some(filename) = files::config_file("log4rs.yml") {
            if log4rs::init_file(filename, Default::default()).is_ok() {
                log_mdc::insert("instruction_count", format!("{:8x}", 0));
            }
            info!(target: "app::instruction", "Start instruction log for '{}'", name);
            info!(target: "app::memory", "Start memory log for '{}'", name);
            info!(target: "app::quetzal", "Start quetzal log for '{}'", name);
            info!(target: "app::stream", "Start stream log for '{}'", name);
            info!(target: "app::trace", "Configuration: {:?}", config);
        }
    }

    let prev = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        debug!("{}", &info);
        prev(info);
    }));

    let mut data = Vec::new();
    match File::open(filename) {
        Ok(mut f) => {
            if let Err(e) = f.read_to_end(&mut data) {
                error!(target: "app::trace", "Error reading {}: {}", filename, e);
                println!("Error reading {}", filename);
                exit(-1);
            }
        }
        Err(e) => {
            error!(target: "app::trace", "Error reading {}: {}", filename, e);
            println!("Error reading {}", filename);
            exit(-1);
        }
    }

    let mut glulx = match Glulx::new(data, &config) {
        Ok(glulx) => glulx,
        Err(e) => {
            error!(target: "app::trace", "{}", e);
            println!("Error loading {}: {}", filename, e);
            return ExitCode::FAILURE;
        }
    };

    trace!("Beginning execution");
    let mut response = None;
    loop {
        match glulx.execute(response.take()) {
            Ok(Some(request)) => {
                deliver(request.output());
                response = Some(answer(&request, &name));
            }
            Ok(None) => {
                deliver(&glulx.flush_output());
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                error!(target: "app::trace", "{}", e);
                println!("\n{}", e);
                return ExitCode::FAILURE;
            }
        }
    }
}
