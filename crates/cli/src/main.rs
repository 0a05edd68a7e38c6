use std::process::ExitCode;

fn main() -> ExitCode {
    orumaiv_cli::run()
}
