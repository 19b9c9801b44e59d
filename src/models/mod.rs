mod resource;

pub use resource::{GraphicsCard, ProcessResource, SystemResource};
