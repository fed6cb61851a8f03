mod azure;

pub use azure::{resolve_filter, AzureProvider, BuildSource, DEFAULT_TTL};
