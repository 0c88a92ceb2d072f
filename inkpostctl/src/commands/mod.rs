pub mod browse;
pub mod check;
pub mod draft;
pub mod history;
