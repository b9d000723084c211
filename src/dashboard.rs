/// Dashboard loop
///
/// Owns everything the HMI window shows: the tank gauge, the level label and
/// the emergency-stop command. The newest poll result waits in a reading
/// slot and command outcomes queue on their own channel; both are applied on
/// the UI thread in `process_events`.

use crate::config_loader::HmiSettings;
use crate::gateway::{Command, ControlApi, GatewayError, Reading};
use crate::gauge::TankGauge;
use crate::poller::{take_reading_from_slot, Poller, ReadingSlot, RepaintFn};
use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::runtime::Handle;

pub const INITIAL_LEVEL_LABEL: &str = "0.0 L";

/// Result of one emergency-stop request, delivered back to the UI thread.
pub type CommandOutcome = Result<String, GatewayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Content of an operator-facing modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    /// Acknowledgement or failure report for an emergency-stop attempt.
    pub fn for_command(result: &Result<String, GatewayError>) -> Self {
        match result {
            Ok(_) => Notice {
                level: NoticeLevel::Info,
                title: "Control System".to_string(),
                message: "Emergency Stop Sent!".to_string(),
            },
            Err(e) => Notice {
                level: NoticeLevel::Error,
                title: "Control Error".to_string(),
                message: format!("Control Failed: {}", e),
            },
        }
    }
}

pub trait Notifier {
    fn notify(&self, notice: &Notice);
}

/// Blocking native message box.
pub struct DialogNotifier;

impl Notifier for DialogNotifier {
    fn notify(&self, notice: &Notice) {
        let level = match notice.level {
            NoticeLevel::Info => rfd::MessageLevel::Info,
            NoticeLevel::Error => rfd::MessageLevel::Error,
        };
        let _ = rfd::MessageDialog::new()
            .set_level(level)
            .set_title(notice.title.as_str())
            .set_description(notice.message.as_str())
            .set_buttons(rfd::MessageButtons::Ok)
            .show();
    }
}

pub struct Dashboard {
    settings: HmiSettings,
    api: Arc<dyn ControlApi>,
    runtime: Handle,
    notifier: Box<dyn Notifier>,
    repaint: RepaintFn,
    reading_slot: ReadingSlot,
    outcomes_tx: Sender<CommandOutcome>,
    outcomes_rx: Receiver<CommandOutcome>,
    poller: Poller,
    gauge: TankGauge,
    latest: Option<Reading>,
    level_label: String,
    last_update: Option<DateTime<Local>>,
    commands_pending: usize,
}

impl Dashboard {
    /// Build the view with its data source already wired and start polling.
    pub fn new(
        settings: HmiSettings,
        api: Arc<dyn ControlApi>,
        runtime: Handle,
        notifier: Box<dyn Notifier>,
        repaint: RepaintFn,
    ) -> Self {
        let reading_slot: ReadingSlot = Arc::new(Mutex::new(None));
        let (outcomes_tx, outcomes_rx) = unbounded();
        let gauge = TankGauge::new(settings.tank_capacity, settings.display_range, settings.transition());
        let poller = Poller::start(
            &runtime,
            Arc::clone(&api),
            settings.poll_interval(),
            Arc::downgrade(&reading_slot),
            Arc::clone(&repaint),
        );

        Self {
            settings,
            api,
            runtime,
            notifier,
            repaint,
            reading_slot,
            outcomes_tx,
            outcomes_rx,
            poller,
            gauge,
            latest: None,
            level_label: INITIAL_LEVEL_LABEL.to_string(),
            last_update: None,
            commands_pending: 0,
        }
    }

    pub fn apply_reading(&mut self, reading: Reading, now: Instant) {
        self.gauge.set_level(reading.value, now);
        self.level_label = format!("{:.2} L", reading.value);
        self.last_update = Some(Local::now());
        self.latest = Some(reading);
    }

    /// Apply the newest pending reading, then every finished command.
    /// Returns how many updates were handled.
    pub fn process_events(&mut self, now: Instant) -> usize {
        let mut handled = 0;
        if let Some(reading) = take_reading_from_slot(&self.reading_slot) {
            self.apply_reading(reading, now);
            handled += 1;
        }
        while let Ok(result) = self.outcomes_rx.try_recv() {
            handled += 1;
            self.commands_pending = self.commands_pending.saturating_sub(1);
            match &result {
                Ok(body) => info!(target: "dashboard", "Emergency stop acknowledged: {}", body),
                Err(e) => error!(target: "dashboard", "Emergency stop failed: {}", e),
            }
            self.notifier.notify(&Notice::for_command(&result));
        }
        handled
    }

    /// Send the stop command. No confirmation and no de-duplication:
    /// every call issues one request.
    pub fn emergency_stop(&mut self) {
        let command = Command::new(self.settings.stop_tag_id, self.settings.stop_value);
        info!(target: "dashboard", "EMERGENCY STOP pressed, sending tag_id={} value={:.2}", command.tag_id, command.value);

        self.commands_pending += 1;
        let api = Arc::clone(&self.api);
        let tx = self.outcomes_tx.clone();
        let repaint = Arc::clone(&self.repaint);
        self.runtime.spawn(async move {
            let result = api.send_command(&command).await;
            if tx.send(result).is_err() {
                debug!(target: "dashboard", "Dashboard closed before command outcome arrived");
                return;
            }
            repaint();
        });
    }

    pub fn gauge(&self) -> &TankGauge {
        &self.gauge
    }

    pub fn level_label(&self) -> &str {
        &self.level_label
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.latest.as_ref()
    }

    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.last_update
    }

    pub fn commands_pending(&self) -> usize {
        self.commands_pending
    }

    pub fn settings(&self) -> &HmiSettings {
        &self.settings
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn shutdown(&self) {
        self.poller.stop();
    }
}
