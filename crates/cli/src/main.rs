use std::process::ExitCode;

fn main() -> ExitCode {
    matchcast_cli::run()
}
