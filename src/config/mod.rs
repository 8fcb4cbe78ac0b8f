pub mod feed;
pub mod fallback;
pub mod loader;

pub use fallback::FallbackConfig;
pub use feed::FeedConfig;
