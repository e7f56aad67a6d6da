pub mod job;
pub mod problem;
pub mod profile;
pub mod resume;
pub mod template;
