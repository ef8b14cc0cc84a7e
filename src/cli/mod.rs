pub mod dashboard;
pub mod etf;
pub mod sector_growth;
pub mod setup;
pub mod status;
pub mod ui;
