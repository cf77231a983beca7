//! Constellation GUI - live I/Q scatter plot
//!
//! Runs the same startup sequence as the console viewer, then plots the
//! display buffer with the ideal 16-QAM grid as reference.

mod app;
mod state;

use app::ConstellationApp;
use clap::Parser;
use iq_constellation::{Args, Session};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut session = Session::connect(
        &args.link_config(),
        args.capture_config(),
        args.stats_config(),
        args.rng(),
    )?;
    session.launch(args.noise())?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 900.0])
            .with_min_inner_size([600.0, 500.0]),
        ..Default::default()
    };

    let tick_period = args.tick_period();
    let port = args.port.clone();
    eframe::run_native(
        "Real-time Constellation Diagram",
        options,
        Box::new(move |cc| Ok(Box::new(ConstellationApp::new(cc, session, tick_period, port)))),
    )?;
    Ok(())
}
