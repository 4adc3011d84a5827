pub mod serve;
pub mod sessions;
pub mod status;
