pub mod channels;
pub mod chat;
pub mod monitor;
pub mod queue;
pub mod videos;
