pub mod app;
pub mod favorites;
pub mod models;
pub mod session;
pub mod storage;
pub mod tmdb;
