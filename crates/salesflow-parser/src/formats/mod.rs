mod delimited;
mod spreadsheet;
mod structured;

pub use delimited::DelimitedParser;
pub use spreadsheet::SpreadsheetParser;
pub use structured::StructuredParser;
