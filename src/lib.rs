pub mod agenda;
pub mod availability;
pub mod compactor;
pub mod config;
pub mod journal;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod seed;
pub mod store;
pub mod wizard;
