pub mod admin_view;
pub mod dto;
pub mod live_cache;
pub mod roster_store;
pub mod scheduler;
pub mod session;
