//! Persistence layer: a single `Repository` trait collapsing the source
//! system's `SKIP_DB` direct-DB-vs-HTTP-gateway dual path (REDESIGN FLAGS,
//! spec §9) behind two interchangeable implementations.

pub mod http_repo;
pub mod repository;
pub mod sqlite_repo;

pub use repository::Repository;
pub use sqlite_repo::SqliteRepository;
