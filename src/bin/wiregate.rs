//! CLI entry point: starts the proxy engine on its own worker thread
//! and drives the UI boundary of spec.md §6 from stdin, printing bus
//! events to stdout as they arrive.
//!
//! Grounded on the teacher's commented-out `src/main.rs` (a single
//! positional argument read via `std::env::args().nth(1)`) and
//! `src/bin/demo_server.rs` (spawn the server loop, then block on a
//! foreground command source).
use std::io::{self, BufRead, Write as _};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use wiregate::bus::Event;
use wiregate::gate::Gate;
use wiregate::{Bus, Engine, ProxyConfig};

fn main() {
    env_logger::init();

    let port_arg = std::env::args().nth(1);
    let config = ProxyConfig::from_port_arg(port_arg.as_deref());
    if let Err(e) = config.validate() {
        log::error!("invalid configuration: {e}");
        std::process::exit(1);
    }

    let (bus_handle, bus) = Bus::new();
    let gate = Arc::new(Gate::new());
    let engine = Arc::new(Engine::new(config.clone(), bus_handle.clone(), Arc::clone(&gate)));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let engine_for_thread = Arc::clone(&engine);
    let server = thread::spawn(move || {
        if let Err(e) = engine_for_thread.run(addr) {
            log::error!("engine exited with fatal error: {e}");
            std::process::exit(1);
        }
    });

    let explorer_bus = bus_handle.clone();
    let explorer_config = config.clone();
    thread::spawn(move || run_commands(engine, explorer_config, explorer_bus));

    for event in std::iter::from_fn(|| bus.recv()) {
        print_event(&event);
        if matches!(event, Event::Finished) {
            break;
        }
    }

    let _ = server.join();
}

fn print_event(event: &Event) {
    match event {
        Event::Log(text) => println!("[log] {text}"),
        Event::ClientMessage { headers_text, body } => {
            println!("[client_message] {} bytes body\n{headers_text}", body.len())
        }
        Event::OriginMessage { headers_text, body } => {
            println!("[origin_message] {} bytes body\n{headers_text}", body.len())
        }
        Event::NewHost(host) => println!("[new_host] {host}"),
        Event::GateOpened => println!("[gate_opened]"),
        Event::Finished => println!("[finished]"),
        Event::SiteTreeUpdated(text) => println!("[update_site_tree]\n{text}"),
    }
}

/// Reads operator commands from stdin until EOF or `stop`:
///   open
///   load-client <headers-file> [body-file]
///   load-origin <headers-file> [body-file]
///   stop
///   spider <url>
///   mirror <url> <dir>
///
/// The real UI shows headers as text and the body in a hex editor
/// (out of scope here, per spec.md §1); this command loop takes both
/// as separate files so body edits are still exercisable from a
/// terminal.
fn run_commands(engine: Arc<Engine>, config: ProxyConfig, bus: wiregate::BusHandle) {
    let stdin = io::stdin();
    print!("> ");
    let _ = io::stdout().flush();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("open") => engine.gate().open(),
            Some("stop") => {
                engine.stop();
                break;
            }
            Some("load-client") => {
                if let Some(headers_path) = parts.next() {
                    load_override(&engine.gate(), headers_path, parts.next(), true);
                }
            }
            Some("load-origin") => {
                if let Some(headers_path) = parts.next() {
                    load_override(&engine.gate(), headers_path, parts.next(), false);
                }
            }
            Some("spider") => {
                if let Some(url) = parts.next() {
                    let text = wiregate::explorer::spider(url, &config, &bus);
                    bus.send(Event::SiteTreeUpdated(text));
                }
            }
            Some("mirror") => {
                let (url, dir) = (parts.next(), parts.next());
                if let (Some(url), Some(dir)) = (url, dir) {
                    match wiregate::explorer::mirror(url, std::path::Path::new(dir), &config, &bus) {
                        Ok(text) => bus.send(Event::SiteTreeUpdated(text)),
                        Err(e) => bus.log(format!("mirror failed: {e}")),
                    }
                }
            }
            Some(other) => bus.log(format!("unknown command: {other}")),
            None => {}
        }
        print!("> ");
        let _ = io::stdout().flush();
    }
}

fn load_override(gate: &Gate, headers_path: &str, body_path: Option<&str>, is_client: bool) {
    let headers_bytes = match std::fs::read(headers_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("could not read header override file {headers_path:?}: {e}");
            return;
        }
    };
    let body = match body_path {
        Some(path) => match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("could not read body override file {path:?}: {e}");
                return;
            }
        },
        None => Vec::new(),
    };

    let headers_text = String::from_utf8_lossy(&headers_bytes).into_owned();
    if is_client {
        gate.load_client_message(&headers_text, body);
    } else {
        gate.load_origin_message(&headers_text, body);
    }
}
