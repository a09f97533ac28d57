pub mod agent;
pub mod conversation;
pub mod proactive;
pub mod runtime;
pub mod search;
pub mod selection;
pub mod sweep;

#[cfg(test)]
mod tests;
