pub mod bootstrap;
pub mod commands;
pub mod google_sync;
pub mod reminder_scheduler;
