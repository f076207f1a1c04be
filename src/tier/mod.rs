pub mod audit;
pub mod config;
pub mod interrupt;
pub mod ledger;
pub mod lock;
pub mod paths;
pub mod policy;
pub mod resolver;
pub mod service;
pub mod sweep;
pub mod transfer;
pub mod util;
pub mod warn;
