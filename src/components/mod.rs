pub mod actions;
pub mod history;
