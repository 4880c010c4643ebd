pub mod notification;
pub mod order_service;
pub mod position_monitor;
pub mod signal_service;
pub mod telegram_service;
