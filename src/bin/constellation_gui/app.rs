//! Main GUI application

use crate::state::{ideal_points, PlotView, UiState, AXIS_LIMIT};
use eframe::egui;
use egui_plot::{MarkerShape, Plot, PlotPoints, Points};
use iq_constellation::{snapshot_lines, ControlEvent, Flow, Session, Ticker};
use serialport::SerialPort;
use std::time::{Duration, Instant};

/// Main application struct
pub struct ConstellationApp {
    session: Session<Box<dyn SerialPort>>,
    ticker: Ticker,
    view: PlotView,
    ui: UiState,
    port: String,
}

impl ConstellationApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        session: Session<Box<dyn SerialPort>>,
        tick_period: Duration,
        port: String,
    ) -> Self {
        Self {
            session,
            ticker: Ticker::new(tick_period),
            view: PlotView::default(),
            ui: UiState::default(),
            port,
        }
    }

    /// Map key presses to control events
    fn poll_keys(&self, ctx: &egui::Context) -> Vec<ControlEvent> {
        ctx.input(|i| {
            [
                (egui::Key::Space, ControlEvent::TogglePause),
                (egui::Key::C, ControlEvent::Clear),
                (egui::Key::R, ControlEvent::ForceRefresh),
                (egui::Key::Q, ControlEvent::Quit),
            ]
            .into_iter()
            .filter(|(key, _)| i.key_pressed(*key))
            .map(|(_, event)| event)
            .collect()
        })
    }

    fn apply(&mut self, ctx: &egui::Context, event: ControlEvent) {
        match self.session.handle(event) {
            Ok(Flow::Quit) => {
                self.ui.status = "Exiting".to_string();
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
            }
            Ok(Flow::Continue) => {
                self.ui.error = None;
                self.ui.status = match event {
                    ControlEvent::Clear => "Data cleared".to_string(),
                    ControlEvent::ForceRefresh => "Manual refresh".to_string(),
                    _ if self.session.controller().is_running() => "Capturing".to_string(),
                    _ => "Paused".to_string(),
                };
            }
            Err(e) => {
                self.ui.error = Some(format!("{:?} failed: {}", event, e));
            }
        }
    }

    /// Render the top toolbar
    fn render_toolbar(&mut self, ctx: &egui::Context) {
        let mut clicked = None;

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Constellation");
                ui.label(&self.port);
                ui.separator();

                let label = if self.view.snapshot.running {
                    "⏸ Pause"
                } else {
                    "▶ Resume"
                };
                if ui.button(label).clicked() {
                    clicked = Some(ControlEvent::TogglePause);
                }
                if ui.button("🗑 Clear").clicked() {
                    clicked = Some(ControlEvent::Clear);
                }
                if ui.button("⟳ Refresh").clicked() {
                    clicked = Some(ControlEvent::ForceRefresh);
                }
                if ui.button("⏹ Quit").clicked() {
                    clicked = Some(ControlEvent::Quit);
                }

                // Status on the right
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if let Some(error) = &self.ui.error {
                        ui.colored_label(egui::Color32::RED, error);
                    } else {
                        ui.label(&self.ui.status);
                    }
                });
            });
        });

        if let Some(event) = clicked {
            self.apply(ctx, event);
        }
    }

    /// Render the left sidebar with the statistics block
    fn render_sidebar(&self, ctx: &egui::Context) {
        egui::SidePanel::left("sidebar")
            .resizable(true)
            .default_width(200.0)
            .show(ctx, |ui| {
                ui.heading("Info");
                for line in snapshot_lines(&self.view.snapshot) {
                    ui.label(line);
                }
                ui.separator();

                ui.heading("Controls");
                ui.label("Space: Pause/Resume");
                ui.label("C: Clear data");
                ui.label("R: Force refresh");
                ui.label("Q: Exit");
            });
    }

    /// Render the scatter plot
    fn render_plot(&self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            Plot::new("constellation")
                .data_aspect(1.0)
                .include_x(-AXIS_LIMIT)
                .include_x(AXIS_LIMIT)
                .include_y(-AXIS_LIMIT)
                .include_y(AXIS_LIMIT)
                .allow_zoom(false)
                .allow_drag(false)
                .x_axis_label("I (In-phase)")
                .y_axis_label("Q (Quadrature)")
                .show(ui, |plot_ui| {
                    plot_ui.points(
                        Points::new(PlotPoints::from(ideal_points()))
                            .shape(MarkerShape::Cross)
                            .radius(6.0)
                            .color(egui::Color32::from_rgba_unmultiplied(255, 0, 0, 80))
                            .name("Ideal"),
                    );
                    plot_ui.points(
                        Points::new(PlotPoints::from(self.view.points.clone()))
                            .radius(2.5)
                            .color(egui::Color32::from_rgb(40, 90, 220))
                            .name("Captured"),
                    );
                });
        });
    }
}

impl eframe::App for ConstellationApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        for event in self.poll_keys(ctx) {
            self.apply(ctx, event);
        }

        // Drain and summarise on the fixed tick cadence
        let now = Instant::now();
        if self.view.ticks == 0 || self.ticker.is_due(now) {
            self.session.tick_into(&mut self.view);
        }
        ctx.request_repaint_after(self.ticker.remaining(Instant::now()));

        // Render UI
        self.render_toolbar(ctx);
        self.render_sidebar(ctx);
        self.render_plot(ctx);
    }
}
