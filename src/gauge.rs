/// Tank level gauge
///
/// Maps a reading in [0, capacity] onto a fill height in [0, display_range]
/// and eases the drawn height toward it linearly over a fixed transition.

use eframe::egui;
use egui::{Color32, Rect, Sense, Stroke};
use std::time::{Duration, Instant};

pub const TANK_WIDTH: f32 = 100.0;
pub const TANK_HEIGHT: f32 = 200.0;
const WATER_COLOR: Color32 = Color32::from_rgb(30, 144, 255); // dodger blue
const OVERFLOW_COLOR: Color32 = Color32::from_rgb(220, 40, 40);

#[derive(Debug, Clone)]
pub struct TankGauge {
    capacity: f64,
    display_range: f64,
    transition: Duration,
    from_height: f64,
    target_height: f64,
    started_at: Option<Instant>,
}

impl TankGauge {
    pub fn new(capacity: f64, display_range: f64, transition: Duration) -> Self {
        Self {
            capacity,
            display_range,
            transition,
            from_height: 0.0,
            target_height: 0.0,
            started_at: None,
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn display_range(&self) -> f64 {
        self.display_range
    }

    /// Unclamped: values above capacity map past the display range,
    /// negative values map below zero.
    pub fn target_height_for(&self, value: f64) -> f64 {
        (value / self.capacity) * self.display_range
    }

    pub fn target_height(&self) -> f64 {
        self.target_height
    }

    /// Start a transition toward `value`. A transition still running is
    /// superseded and the new one starts from wherever it had got to.
    pub fn set_level(&mut self, value: f64, now: Instant) {
        self.from_height = self.height_at(now);
        self.target_height = self.target_height_for(value);
        self.started_at = Some(now);
    }

    pub fn height_at(&self, now: Instant) -> f64 {
        let Some(start) = self.started_at else {
            return self.target_height;
        };
        if self.transition.is_zero() {
            return self.target_height;
        }
        let elapsed = now.saturating_duration_since(start).as_secs_f64();
        let t = (elapsed / self.transition.as_secs_f64()).min(1.0);
        self.from_height + (self.target_height - self.from_height) * t
    }

    pub fn is_animating(&self, now: Instant) -> bool {
        match self.started_at {
            Some(start) => now.saturating_duration_since(start) < self.transition,
            None => false,
        }
    }

    /// Paint the tank. The fill is clipped to the container; an
    /// over-range height also draws a marker along the top edge.
    pub fn show(&self, ui: &mut egui::Ui, now: Instant) -> egui::Response {
        let (rect, response) = ui.allocate_exact_size(egui::vec2(TANK_WIDTH, TANK_HEIGHT), Sense::hover());
        let painter = ui.painter_at(rect);

        painter.rect_filled(rect, 4.0, Color32::from_gray(40));

        let height = self.height_at(now);
        let fraction = (height / self.display_range) as f32;
        let visible = fraction.clamp(0.0, 1.0) * rect.height();
        if visible > 0.0 {
            let fill_rect = Rect::from_min_max(
                egui::pos2(rect.min.x, rect.max.y - visible),
                rect.max,
            );
            painter.rect_filled(fill_rect, 4.0, WATER_COLOR);
        }
        if fraction > 1.0 {
            let marker = Rect::from_min_size(rect.min, egui::vec2(rect.width(), 4.0));
            painter.rect_filled(marker, 0.0, OVERFLOW_COLOR);
        }

        painter.rect_stroke(rect, 4.0, Stroke::new(2.0, Color32::from_gray(160)));

        if self.is_animating(now) {
            ui.ctx().request_repaint();
        }
        response
    }
}
