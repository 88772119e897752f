pub mod export;
pub mod import;
pub mod init;
pub mod stats;
