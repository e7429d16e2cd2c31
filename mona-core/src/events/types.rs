//! Event type definitions.

use compact_str::CompactString;
use mona_sdk::objects::WsServerMessage;
use std::fmt;

/// A payment percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Percentage(u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("percentage {0} is out of range 0..=100")]
pub struct InvalidPercentage(pub u64);

impl Percentage {
    pub const ZERO: Percentage = Percentage(0);
    pub const MAX: Percentage = Percentage(100);

    pub fn new(value: u8) -> Result<Self, InvalidPercentage> {
        if value > 100 {
            return Err(InvalidPercentage(value as u64));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Percentage {
    type Error = InvalidPercentage;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Where a log sits in the ledger; used for ordering and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// One decoded `PaymentMilestoneReached` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneEvent {
    pub payment_percentage: Percentage,
    pub window_name: CompactString,
    /// `None` for events not sourced from a mined log (e.g. pending logs).
    pub position: Option<LogPosition>,
}

impl MilestoneEvent {
    pub fn new(
        payment_percentage: u8,
        window_name: impl Into<CompactString>,
    ) -> Result<Self, InvalidPercentage> {
        Ok(Self {
            payment_percentage: Percentage::new(payment_percentage)?,
            window_name: window_name.into(),
            position: None,
        })
    }

    pub fn at(mut self, position: LogPosition) -> Self {
        self.position = Some(position);
        self
    }

    /// The `update` message pushed to subscribers for this event.
    pub fn to_update_message(&self) -> WsServerMessage {
        WsServerMessage::Update {
            payment_percentage: self.payment_percentage.get(),
            window_name: self.window_name.clone(),
        }
    }
}
