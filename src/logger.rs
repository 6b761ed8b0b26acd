use std::io::Write;

use log::LevelFilter;

/// Initialize console logging.
///
/// The level comes from `level` when given, otherwise from `RUST_LOG`, and
/// defaults to `info`:
///
/// ```bash
/// # Show every send and thread creation
/// RUST_LOG=debug slack2discord restore --channel general --destination 1234
/// ```
pub fn init_logger(level: Option<LevelFilter>) {
    let level = level
        .or_else(|| {
            std::env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse::<LevelFilter>().ok())
        })
        .unwrap_or(LevelFilter::Info);

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(level)
        .target(env_logger::Target::Stdout)
        .try_init()
        .ok(); // already initialized
}
