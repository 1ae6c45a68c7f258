// Extraction strategy backends

pub mod embed;
pub mod pinterest;
pub mod scrape;
pub mod ytdlp;

pub use embed::EmbedApiStrategy;
pub use pinterest::{PinTarget, PinterestPageStrategy};
pub use scrape::PageScrapeStrategy;
pub use ytdlp::YtDlpStrategy;
