pub mod daily_log;
pub mod group;
pub mod stats;
pub mod user;
