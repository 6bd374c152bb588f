//! `hyprmatectl <command> [args...]`: send one command to the running
//! hyprmate daemon and exit with a status describing the outcome.

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("hyprmatectl: {}", e);
            std::process::exit(hyprmate::command::ExitCode::EnvironmentError.code());
        }
    };
    let code = runtime.block_on(hyprmate::ipc::client::run(&args));
    std::process::exit(code.code());
}
