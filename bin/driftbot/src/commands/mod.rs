pub mod onboard;
pub mod run;
pub mod start;
pub mod status;
pub mod tasks;
