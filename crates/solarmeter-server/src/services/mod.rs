pub mod accounts;
pub mod readings;
pub mod stats;
