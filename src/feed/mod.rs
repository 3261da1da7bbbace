pub mod fetcher;
pub mod parser;

pub use fetcher::{FetchError, FetchOutcome, Fetcher};
pub use parser::{parse_document, synthesize_guid, RemoteDocument, RemoteItem};
