pub mod date;
pub mod instance;
pub mod instance_state;
pub mod models;
pub mod recurrence;
pub mod reminder;
pub mod resolver;
