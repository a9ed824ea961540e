pub mod feed;
pub mod invite;
pub mod leaderboard;
pub mod live;
pub mod notify;
pub mod scoring;
