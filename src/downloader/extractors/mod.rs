// Heuristic extraction shared by strategies and the slideshow extractor
//
// - json_walk: vocabulary-driven search over arbitrary JSON trees
// - page_scan: HTML heuristics (meta tags, state scripts, DOM, raw text)
// - slideshow: the ordered waterfall that turns a post page into a bundle

pub mod json_walk;
pub mod page_scan;
pub mod slideshow;

pub use page_scan::PageAssets;
pub use slideshow::{discover_in_page, fetch_bundle, SlideshowExtractor, SLIDESHOW_STRATEGY};
