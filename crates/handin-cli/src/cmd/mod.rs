pub mod groups;
pub mod leaderboard;
pub mod monitor;
