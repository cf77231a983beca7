//! Constellation console viewer - live capture with an in-place text display
//!
//! Connects to the instrument, programs the noise levels, and refreshes a
//! statistics block in the terminal every tick. Controls are read from stdin
//! (type the key and press Enter).

use clap::Parser;
use crossbeam_channel::Sender;
use iq_constellation::{
    snapshot_lines, Args, ConstellationError, ControlEvent, DisplayBuffer, Flow, Renderer,
    Session, Snapshot, Ticker,
};
use log::warn;
use std::io::{self, BufRead, Write};
use std::thread;

/// Redraws the info block at the top of the terminal
struct ConsoleRenderer {
    port: String,
}

impl Renderer for ConsoleRenderer {
    fn render(&mut self, snapshot: &Snapshot, points: &DisplayBuffer) {
        let mut out = io::stdout().lock();

        // Move cursor to top without clearing (reduces flicker)
        let _ = write!(out, "\x1B[H");
        let _ = writeln!(
            out,
            "Constellation - {} - {}                    ",
            self.port,
            chrono::Local::now().format("%H:%M:%S")
        );
        let _ = writeln!(out, "==================================================");
        for line in snapshot_lines(snapshot) {
            let _ = writeln!(out, "{:<50}", line);
        }
        match points.latest() {
            Some(sample) => {
                let last = format!("Last point: I={:+4} Q={:+4}", sample.i, sample.q);
                let _ = writeln!(out, "{:<50}", last);
            }
            None => {
                let _ = writeln!(out, "{:<50}", "");
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Controls: Space=Pause/Resume, C=Clear, R=Refresh, Q=Quit");
        let _ = write!(out, "\x1B[J");
        let _ = out.flush();
    }
}

/// Forward control keys typed on stdin
fn spawn_key_reader(events: Sender<ControlEvent>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            // A bare Enter stands in for the space bar
            let key = line.trim_end_matches(['\r', '\n']).chars().next().unwrap_or(' ');
            if let Some(event) = ControlEvent::from_key(key) {
                if events.send(event).is_err() {
                    break;
                }
            }
        }
    });
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    println!("Constellation Display");
    println!("=====================");
    println!("Port: {} @ {} baud", args.port, args.baud);
    println!("Noise: AWGN=0x{:04X}, PN=0x{:04X}", args.awgn, args.pn);
    println!();

    let mut session = match Session::connect(
        &args.link_config(),
        args.capture_config(),
        args.stats_config(),
        args.rng(),
    ) {
        Ok(s) => s,
        Err(e @ ConstellationError::Connection { .. }) => {
            eprintln!("Error: {}", e);
            eprintln!("Please check:");
            eprintln!("  1. The instrument is connected and powered");
            eprintln!("  2. The port name is correct");
            eprintln!("  3. No other application is using the port");
            return Err(Box::new(e));
        }
        Err(e) => return Err(Box::new(e)),
    };

    session.launch(args.noise())?;

    let (tx, rx) = crossbeam_channel::unbounded();
    let ctrlc_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(ControlEvent::Quit);
    })?;
    spawn_key_reader(tx);

    // Clear screen once at start
    print!("\x1B[2J\x1B[H");
    io::stdout().flush()?;

    let mut renderer = ConsoleRenderer {
        port: args.port.clone(),
    };
    let mut ticker = Ticker::new(args.tick_period());

    'run: loop {
        for event in rx.try_iter() {
            match session.handle(event) {
                Ok(Flow::Quit) => break 'run,
                Ok(Flow::Continue) => {}
                Err(e) => warn!("{:?} failed: {}", event, e),
            }
        }

        session.tick_into(&mut renderer);
        ticker.wait();
    }

    let total = session.stats().total_captured();
    session.shutdown()?;
    println!("\nProgram finished ({} points captured)", total);
    Ok(())
}
