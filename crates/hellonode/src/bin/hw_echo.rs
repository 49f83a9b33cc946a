use std::process::ExitCode;

use hellonode::shell;
use hellonode::shell::Variant;

#[tokio::main]
async fn main() -> ExitCode {
    shell::main(Variant::Echo).await
}
