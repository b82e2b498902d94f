pub mod csv;
pub mod extract;

pub use csv::{OptionsError, read_options, read_options_file, write_options, write_options_file};
pub use extract::{embedded_options, merge_options};
