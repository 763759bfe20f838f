pub mod receipts;
pub mod request;

pub use receipts::ReceiptApi;
pub use request::{ensure_success, read_json, AuthenticatedClient, RequestBody, RequestOptions};
