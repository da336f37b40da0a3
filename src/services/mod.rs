pub mod ingest;
pub mod multipart;
pub mod sniff;
pub mod staging;
pub mod storage;
