mod num_temporal_layers;

pub use num_temporal_layers::*;
