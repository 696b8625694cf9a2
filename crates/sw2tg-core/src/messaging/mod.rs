//! Messenger abstractions (Telegram today) and the delivery engine on top of them.

pub mod delivery;
pub mod port;
pub mod types;
