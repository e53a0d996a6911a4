pub mod notifier;
pub mod repository;
pub mod sqlite_repo;
