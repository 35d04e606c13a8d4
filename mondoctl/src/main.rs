#![forbid(unsafe_code)]

use mondoctl::MondoctlError;

#[tokio::main]
async fn main() -> Result<(), MondoctlError> {
    mondoctl::run().await
}
