//! Terminal scope and recorder for the ESP32 microphone/ADXL354 board.

use clap::Parser;
use sensorscope::{
    args::{CommandTask, RecordCommand, ScopeArgs, Source},
    config::ScopeConfig,
    connection::Connection,
    export_log::ExportError,
    gui::{device_selector, run_scope},
    session::Session,
    transport::{available_ports, open_input, open_serial, SimulatedTransport, Transport},
};

use log::{info, warn};
use std::{
    error::Error,
    time::{Duration, Instant},
};

// Example:
// cargo run --bin sensorscope -- monitor --port /dev/ttyUSB0 --baud 115200
// cargo run --bin sensorscope -- --format tagged record --simulate --samples 2000 -o run.csv

/// Pace of the simulated board, about 500 frames a second.
const SIMULATED_FRAME_INTERVAL: Duration = Duration::from_millis(2);

/// How long one headless pump waits for data.
const RECORD_POLL: Duration = Duration::from_millis(50);

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = ScopeArgs::parse();
    let config = args.resolve_config()?;
    info!("Starting with {:?}", config);

    let transport = match open_source(&args.command, &config)? {
        Some(transport) => transport,
        None => return Ok(()),
    };

    let mut session = Session::new(&config)?;
    let mut connection = Connection::open(transport);

    match &args.command {
        CommandTask::Monitor(_) => {
            run_scope(&mut session, &mut connection, &config.export_path)?;
        }
        CommandTask::Record(cmd) => {
            record(cmd, &mut session, &mut connection);
            connection.disconnect();
            match session.export_to(&config.export_path) {
                Ok(n) => println!("Wrote {} samples to {}", n, config.export_path.display()),
                Err(ExportError::NoData) => println!("No data to export"),
                Err(e) => return Err(e.into()),
            }
        }
    }

    connection.disconnect();
    let stats = session.stats();
    info!(
        "{} samples from {} lines, {} rejected",
        stats.samples, stats.lines, stats.rejected_lines
    );
    Ok(())
}

/// Opens whatever the user asked to read from. `None` means they backed out
/// of the device picker.
fn open_source(
    command: &CommandTask,
    config: &ScopeConfig,
) -> Result<Option<Box<dyn Transport>>, Box<dyn Error>> {
    match command.source() {
        Source::Port(path) => Ok(Some(Box::new(open_serial(path, config.baud_rate)?))),
        Source::Input(path) => Ok(Some(Box::new(open_input(path)?))),
        Source::Simulate => Ok(Some(Box::new(SimulatedTransport::new(
            config.format,
            SIMULATED_FRAME_INTERVAL,
        )))),
        Source::Unspecified => match command {
            CommandTask::Monitor(_) => pick_port(config),
            CommandTask::Record(_) => {
                let ports = available_ports()?;
                eprintln!("No source given. Available devices:");
                for port in ports {
                    eprintln!("\t{}", port.to_string_lossy());
                }
                Err("pass one of --port, --input or --simulate".into())
            }
        },
    }
}

/// Keeps showing the device picker until a port opens or the user quits.
fn pick_port(config: &ScopeConfig) -> Result<Option<Box<dyn Transport>>, Box<dyn Error>> {
    let mut status: Option<String> = None;
    loop {
        let Some(path) = device_selector(status.as_deref())? else {
            return Ok(None);
        };
        match open_serial(&path, config.baud_rate) {
            Ok(port) => return Ok(Some(Box::new(port))),
            Err(e) => {
                warn!("{}", e);
                status = Some(e.to_string());
            }
        }
    }
}

/// Records without a display until the sample or time limit is hit, or the
/// source stops.
fn record(cmd: &RecordCommand, session: &mut Session, connection: &mut Connection) {
    let deadline = cmd
        .seconds
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .and_then(|d| Instant::now().checked_add(d));
    session.set_sample_limit(cmd.samples);
    connection.record(session, deadline, RECORD_POLL);
}
