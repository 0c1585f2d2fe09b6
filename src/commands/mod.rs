pub mod app_info;
pub mod feeds;
pub mod health;
pub mod trading;
