pub mod config;
pub mod eligible;
pub mod groups;
pub mod health;
pub mod requests;
pub mod roles;

#[cfg(test)]
mod tests;
