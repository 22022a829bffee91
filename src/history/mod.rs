//! Retained history of recently written values.

mod ring;

pub use ring::HistoryRing;
