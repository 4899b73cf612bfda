mod cascade;
mod chat;
pub mod client;
pub mod comments;
pub mod files;
#[cfg(test)]
mod fixtures;
pub mod notifications;
pub mod posts;
mod record;
pub mod social;
mod universities;
mod users;

