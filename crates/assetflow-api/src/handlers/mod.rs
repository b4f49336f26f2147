pub mod assets;
pub mod files;
pub mod health;
pub mod storage;
