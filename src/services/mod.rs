pub mod api;
pub mod connectivity;
pub mod downloads;
pub mod hydrator;
pub mod notifier;
pub mod queue;
pub mod settings;
