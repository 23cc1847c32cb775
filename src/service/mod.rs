mod builder;
mod server;

pub use builder::{BuildErr, CoordinatorBuilder};
pub use server::{Server, serve_participant};
