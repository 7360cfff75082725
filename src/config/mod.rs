pub mod model;
pub mod store;
pub mod timeframe;
pub mod validate;

pub use model::{
    ChartConfig, Config, ConfigDiff, ConfigUpdateEvent, ExchangeKind, NotificationChannel,
    NotificationSymbols, PriorityThresholds, TelegramConfig,
};
pub use store::{ConfigurationStore, ListenerId, UpdateOutcome};
