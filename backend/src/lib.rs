pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod inference;
pub mod records;
pub mod routes;
pub mod storage;

pub use context::AppContext;
pub use routes::configure_routes;
