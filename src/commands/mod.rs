pub mod embed;
pub mod setup;
pub mod status;
