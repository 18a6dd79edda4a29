pub mod ingest;

pub use ingest::{WalletIngestionPipeline, WalletMap};
