pub mod logset;
pub mod logset_cache;
