use std::io::Write;

/// Initializes the process-wide logger. Must be called once, near the top
/// of `main`, before any `log::info!`/`log::warn!` call elsewhere in the
/// workspace.
pub fn init() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(buf, "[{}] {}", record.level(), record.args())
        })
        .try_init();
}
