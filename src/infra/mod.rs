pub mod github;
pub mod svg;
