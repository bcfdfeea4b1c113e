use std::process::ExitCode;

fn main() -> ExitCode {
    menuguard_cli::run()
}
