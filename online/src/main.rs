// Ignore this lint otherwise many warnings are generated for common mathematical notation
#![allow(non_snake_case)]

#[macro_use]
extern crate log;

mod message;
mod session;

use std::env;
use std::error::Error;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use controller::ControlLoop;
use session::{handle_frame, Reply, SessionError};

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let path = env::args().nth(1).unwrap_or_else(|| config::CONFIG_FILE.to_owned());
    let config = config::load(&path)?;
    info!("loaded {}", path);

    let latency = if config.latency.simulate {
        Some(Duration::from_secs_f64(config.latency.actuation_delay))
    } else {
        None
    };
    let port = config.server.port;
    let mut control = ControlLoop::new(config)?;

    let listener = TcpListener::bind(("127.0.0.1", port))?;
    info!("listening on port {}", port);

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                warn!("failed to accept connection: {}", err);
                continue;
            }
        };

        control.reset();
        match serve(&mut control, stream, latency) {
            Ok(()) => info!("disconnected"),
            Err(SessionError::Io(err)) => warn!("connection lost: {}", err),
            Err(err) => {
                error!("{}", err);
                return Err(err.into());
            }
        }
    }

    Ok(())
}

fn serve(control: &mut ControlLoop, stream: TcpStream, latency: Option<Duration>) -> Result<(), SessionError> {
    info!("connected to {}", stream.peer_addr()?);
    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    for line in reader.lines() {
        let line = line?;
        let reply = handle_frame(control, &line)?;

        if let (Reply::Steer(_), Some(latency)) = (&reply, latency) {
            thread::sleep(latency);
        }
        if let Some(frame) = reply.frame() {
            writeln!(writer, "{}", frame)?;
            writer.flush()?;
        }
    }

    Ok(())
}
