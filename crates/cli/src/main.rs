use std::process::ExitCode;

fn main() -> ExitCode {
    agentcart_cli::run()
}
