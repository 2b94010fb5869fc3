pub mod repository_host;
#[cfg(test)]
pub mod testing;

pub use repository_host::{RepositoryHost, UserProfile};
