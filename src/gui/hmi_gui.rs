/// Kora SCADA HMI window
///
/// Tank gauge for the boiler level plus the emergency stop button.
///
/// Run with: cargo run --bin kora_hmi -- [--config path/to/kora_hmi.yaml] [--debug]

use eframe::egui;
use egui::{Color32, RichText};
use clap::Parser;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use kora_hmi::config_loader::{self, HmiSettings};
use kora_hmi::dashboard::{Dashboard, DialogNotifier};
use kora_hmi::gateway::{ControlApi, HttpGateway};
use kora_hmi::gauge::TANK_WIDTH;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to kora_hmi.yaml next to Cargo.toml)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    debug: bool,
}

struct HmiGUI {
    // Declared before the runtime so the poll task is stopped first on drop.
    dashboard: Dashboard,
    _runtime: tokio::runtime::Runtime,
}

impl HmiGUI {
    fn new(ctx: &egui::Context, settings: HmiSettings, api: Arc<dyn ControlApi>, runtime: tokio::runtime::Runtime) -> Self {
        let repaint_ctx = ctx.clone();
        let dashboard = Dashboard::new(
            settings,
            api,
            runtime.handle().clone(),
            Box::new(DialogNotifier),
            Arc::new(move || repaint_ctx.request_repaint()),
        );
        Self { dashboard, _runtime: runtime }
    }
}

impl eframe::App for HmiGUI {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        self.dashboard.process_events(now);

        // Keep drawing at the poll rate even if a wakeup is missed
        ctx.request_repaint_after(self.dashboard.settings().poll_interval());

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add_space(10.0);
            ui.vertical_centered(|ui| {
                ui.group(|ui| {
                    ui.set_min_width(TANK_WIDTH + 40.0);
                    ui.vertical_centered(|ui| {
                        ui.label(RichText::new("Boiler Status").strong());
                        ui.add_space(6.0);
                        self.dashboard.gauge().show(ui, now);
                        ui.add_space(6.0);
                        ui.label(RichText::new(self.dashboard.level_label()).size(22.0).strong());
                        match self.dashboard.last_update() {
                            Some(at) => ui.small(format!("Updated {}", at.format("%H:%M:%S"))),
                            None => ui.small("Waiting for data..."),
                        };
                    });
                });

                ui.add_space(20.0);

                let stop_button = egui::Button::new(
                    RichText::new("EMERGENCY STOP").color(Color32::WHITE).strong().size(18.0),
                )
                .fill(Color32::from_rgb(255, 0, 0))
                .min_size(egui::vec2(220.0, 44.0));
                if ui.add(stop_button).clicked() {
                    self.dashboard.emergency_stop();
                }
                if self.dashboard.commands_pending() > 0 {
                    ui.small("Sending stop command...");
                }
            });
        });
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("Failed to create async runtime")
}

fn main() {
    let args = Args::parse();
    let default_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let settings = match config_loader::load_settings(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("✗ Failed to load settings: {:#}", e);
            std::process::exit(1);
        }
    };

    let api: Arc<dyn ControlApi> = match HttpGateway::new(&settings.base_url, settings.request_timeout()) {
        Ok(gateway) => Arc::new(gateway),
        Err(e) => {
            eprintln!("✗ Failed to create API client: {}", e);
            std::process::exit(1);
        }
    };

    let runtime = match build_runtime() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ {:#}", e);
            std::process::exit(1);
        }
    };

    let title = settings.window_title.clone();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(&title)
            .with_inner_size([400.0, 600.0]),
        ..Default::default()
    };

    log::info!("Starting {} against {}", title, settings.base_url);
    if let Err(e) = eframe::run_native(
        &title,
        options,
        Box::new(move |cc| Box::new(HmiGUI::new(&cc.egui_ctx, settings, api, runtime))),
    ) {
        eprintln!("✗ GUI error: {}", e);
        std::process::exit(1);
    }
}
