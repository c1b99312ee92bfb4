fn main() {
    // Embed UTC build timestamp, reported by /api/version.
    let now = time_now_utc();
    println!("cargo:rustc-env=KISS_BUILD_TIME={now}");
}

/// UTC timestamp from `date`, or "unknown" where the command is unavailable.
fn time_now_utc() -> String {
    use std::process::Command;
    Command::new("date")
        .args(["-u", "+%Y-%m-%dT%H:%M:%SZ"])
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
