//! One-time first-run notice.

use startstop_core::ResolvedConfig;
use std::io::{self, BufRead, IsTerminal, Write};

pub fn render(config: &ResolvedConfig) -> String {
    let pattern = &config.script_pattern;
    format!(
        "========================\n\
         \x20First Run Instructions\n\
         ========================\n\
         This agent registers itself to auto-launch with SteamVR.\n\
         When it runs it will in turn run all {pattern} files in {start}.\n\
         If there are {pattern} files in {stop} it will stay and run those on shutdown.\n\
         This message is only shown once; to see it again delete {log}.\n\
         If there are shutdown scripts the agent keeps running until SteamVR exits.\n",
        start = config.start_dir.display(),
        stop = config.stop_dir.display(),
        log = config.log_file.display(),
    )
}

/// Prints the notice to stderr. With `wait_for_ack` and an interactive stdin,
/// blocks until the user presses Enter.
pub fn show(config: &ResolvedConfig, wait_for_ack: bool) {
    let mut stderr = io::stderr().lock();
    let _ = stderr.write_all(render(config).as_bytes());

    if wait_for_ack && io::stdin().is_terminal() {
        let _ = stderr.write_all(b"Press [Enter] to continue.\n");
        let _ = stderr.flush();
        drop(stderr);
        let mut line = String::new();
        if let Err(err) = io::stdin().lock().read_line(&mut line) {
            tracing::warn!(error = %err, "Failed to read first-run acknowledgement");
        }
    }
}
