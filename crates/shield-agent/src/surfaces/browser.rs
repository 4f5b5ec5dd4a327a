//! Best-effort closing of open browser tabs on blocked destinations.
//!
//! Drives the scriptable interface of known browsers through `osascript`.
//! Not load-bearing for correctness; a failure is logged and ignored.

use std::time::Duration;

use tracing::debug;

use crate::cmd;

/// Deadline for one scripting-bridge invocation.
const OSASCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Browsers with a usable scripting interface.
const BROWSERS: &[&str] = &["Safari", "Google Chrome"];

fn close_script(app: &str, domain: &str) -> String {
    // Domains are canonical LDH strings, so embedding them in the script
    // cannot break out of the quoted literal.
    format!(
        r#"if application "{app}" is running then
    tell application "{app}"
        set windowList to every window
        repeat with w in windowList
            set tabList to every tab of w
            repeat with t in tabList
                if URL of t contains "{domain}" then close t
            end repeat
        end repeat
    end tell
end if"#
    )
}

/// Closes open tabs whose URL matches the domain, in every known browser.
///
/// Always returns; per-browser failures are logged at `warn` inside the
/// command runner.
pub async fn close_matching_tabs(domain: &str, external_commands: bool) {
    if !external_commands {
        return;
    }
    for app in BROWSERS {
        debug!(browser = app, domain, "closing matching tabs");
        cmd::run_best_effort(
            "osascript",
            &["-e", &close_script(app, domain)],
            OSASCRIPT_TIMEOUT,
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_targets_the_domain_and_app() {
        let script = close_script("Safari", "reddit.com");
        assert!(script.contains(r#"if application "Safari" is running"#));
        assert!(script.contains(r#"URL of t contains "reddit.com""#));
    }
}
