pub mod enrichment;

pub use enrichment::HttpTopicEnrichment;
