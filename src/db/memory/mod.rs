mod resources;

pub use resources::*;
