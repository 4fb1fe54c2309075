pub mod dashboard;
pub mod export;
pub mod journal;
pub mod settings;
