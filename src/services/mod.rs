pub mod filter_service;
pub mod lardi_service;
pub mod profile_service;
pub mod session_service;
pub mod shutdown_service;
pub mod telegram_service;
