pub mod engine;
pub mod fetcher;
pub mod inventory;
pub mod metadata;
pub mod paths;
pub mod planner;
pub mod retry;
pub mod timestamp;
