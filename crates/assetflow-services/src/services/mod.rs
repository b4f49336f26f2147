pub mod clamav;
pub mod gateway;
pub mod ingestion;
