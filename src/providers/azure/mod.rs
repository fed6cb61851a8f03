mod aggregate;
mod cache;
mod client;
mod filter;
mod links;
mod provider;
mod source;
mod staleness;
#[cfg(test)]
mod testing;
mod types;

pub use cache::DEFAULT_TTL;
pub use filter::resolve_filter;
pub use provider::AzureProvider;
pub use source::BuildSource;
