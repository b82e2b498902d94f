pub mod model;
pub mod reader;
pub mod writer;

pub use model::*;
pub use reader::{ModelError, parse_model, read_model_file};
pub use writer::{write_model, write_model_file};
