pub mod config;
pub mod enums;
pub mod error;
pub mod db;
pub mod store;
pub mod fees;
pub mod payload;
pub mod ledger;
pub mod saga;
pub mod notify;
pub mod storage;
pub mod services;
pub mod watchdog;
pub mod engine;
pub mod api;

pub use config::{ Config, EngineSettings };
pub use engine::Engine;
pub use enums::{ TransactionKind, TransactionStatus, PayoutStatus, Resolution };
pub use error::{ AppError, Result };
