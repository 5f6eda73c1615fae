mod collect;

pub use collect::{collect, CollectionConfig, CollectionResult};
