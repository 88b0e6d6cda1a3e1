use crate::core::timeframe::DisplayZone;
use crate::models::signal::{SignalEvent, SignalType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;

/// Every admitted event of one pass.
#[derive(Debug, Clone)]
pub struct AlertBatch {
    pub generated_at: DateTime<Utc>,
    pub events: Vec<SignalEvent>,
    display_zone: DisplayZone,
}

#[derive(Debug, Serialize)]
struct EventView<'a> {
    #[serde(flatten)]
    event: &'a SignalEvent,
    candle_time_display: String,
}

#[derive(Debug, Serialize)]
struct BatchView<'a> {
    generated_at: DateTime<Utc>,
    generated_at_display: String,
    total: usize,
    buys: Vec<EventView<'a>>,
    sells: Vec<EventView<'a>>,
    text: String,
}

impl AlertBatch {
    pub fn new(generated_at: DateTime<Utc>, events: Vec<SignalEvent>, display_zone: DisplayZone) -> Self {
        Self {
            generated_at,
            events,
            display_zone,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn of_type(&self, signal_type: SignalType) -> impl Iterator<Item = &SignalEvent> {
        self.events.iter().filter(move |e| e.signal_type == signal_type)
    }

    pub fn buys(&self) -> Vec<&SignalEvent> {
        self.of_type(SignalType::Buy).collect()
    }

    pub fn sells(&self) -> Vec<&SignalEvent> {
        self.of_type(SignalType::Sell).collect()
    }

    /// Human-readable message, timestamps in the display zone.
    pub fn render_text(&self) -> String {
        let buys = self.buys();
        let sells = self.sells();
        let mut text = String::new();

        let _ = writeln!(text, "CipherB alert: {} signal(s)", self.len());
        let _ = writeln!(
            text,
            "Generated {}",
            self.display_zone.render(self.generated_at).time_only()
        );

        for (heading, events) in [("BUY", &buys), ("SELL", &sells)] {
            if events.is_empty() {
                continue;
            }
            let _ = writeln!(text, "\n{} SIGNALS:", heading);
            for (i, event) in events.iter().enumerate() {
                let _ = writeln!(
                    text,
                    "{}. {} | WT {:.1}/{:.1} | {} | candle {}",
                    i + 1,
                    event.symbol,
                    event.wt1,
                    event.wt2,
                    event.exchange_used,
                    self.display_zone.render(event.source_timestamp)
                );
            }
        }

        let _ = write!(
            text,
            "\nTotal: {} | Buy: {} | Sell: {}",
            self.len(),
            buys.len(),
            sells.len()
        );
        text
    }

    fn view<'a>(&self, event: &'a SignalEvent) -> EventView<'a> {
        EventView {
            event,
            candle_time_display: self.display_zone.render(event.source_timestamp).to_string(),
        }
    }

    /// JSON body posted by webhook sinks.
    pub fn to_payload(&self) -> serde_json::Value {
        let body = BatchView {
            generated_at: self.generated_at,
            generated_at_display: self.display_zone.render(self.generated_at).to_string(),
            total: self.len(),
            buys: self.of_type(SignalType::Buy).map(|e| self.view(e)).collect(),
            sells: self.of_type(SignalType::Sell).map(|e| self.view(e)).collect(),
            text: self.render_text(),
        };
        serde_json::to_value(body).unwrap_or(serde_json::Value::Null)
    }
}
