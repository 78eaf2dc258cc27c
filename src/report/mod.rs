//! AutoPkg run report handling

pub mod parser;
pub mod receipts;

pub use parser::{FailureRow, ReportParser, RunOutcome, SummaryRow};
pub use receipts::{ReceiptInfo, ReceiptScanner};
