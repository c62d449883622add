use std::process::{Command, Stdio};

use tracing::{debug, warn};
use widget_core::{AuthError, PopupLauncher};

/// Opens the authorization page in the user's default browser.
pub struct SystemBrowserLauncher {
    program: &'static str,
}

impl SystemBrowserLauncher {
    pub fn new() -> Self {
        Self {
            program: opener_for(std::env::consts::OS),
        }
    }
}

fn opener_for(os: &str) -> &'static str {
    match os {
        "macos" => "open",
        "windows" => "explorer",
        _ => "xdg-open",
    }
}

impl PopupLauncher for SystemBrowserLauncher {
    fn open(&self, url: &str) -> Result<(), AuthError> {
        debug!(program = self.program, "launching browser");
        match Command::new(self.program)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(_child) => Ok(()),
            Err(e) => {
                warn!(program = self.program, error = %e, "browser launch failed");
                Err(AuthError::PopupBlocked)
            }
        }
    }
}
