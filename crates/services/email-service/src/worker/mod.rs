//! Channel consumers driving the notifier.

mod consumer;

pub use consumer::{EmailConsumer, Settled};
