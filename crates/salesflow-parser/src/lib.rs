pub mod errors;
pub mod formats;
mod registry;

pub use errors::ParserError;
pub use formats::{DelimitedParser, SpreadsheetParser, StructuredParser};
pub use registry::{parse_file, parser_for, FileFormat, FileParser};
