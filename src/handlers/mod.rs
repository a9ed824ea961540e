pub mod daily_logs;
pub mod groups;
pub mod health;
pub mod users;
pub mod ws;
