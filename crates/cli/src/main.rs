use std::process::ExitCode;

fn main() -> ExitCode {
    waypoint_cli::run()
}
