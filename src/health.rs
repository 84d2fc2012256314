//! System health checks for sparsesync
//!
//! This module provides preflight checks to verify the system is properly
//! configured before running operations.

use crate::config::Config;
use crate::session::Session;
use std::path::Path;

/// Environment variable holding the Gitea account password.
pub const PASSWORD_ENV: &str = "SPARSESYNC_PASSWORD";

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Git installation status
    pub git: CheckResult,
    /// Gitea authentication status
    pub service_auth: CheckResult,
    /// Destination directory status
    pub destination: CheckResult,
    /// Password environment variable status (warning only)
    pub password_env: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub async fn run(config: &Config) -> Self {
        Self {
            git: Self::check_git(),
            service_auth: Self::check_service_auth(config).await,
            destination: Self::check_destination(config),
            password_env: Self::check_password_env(),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.git.passed && self.service_auth.passed && self.destination.passed
        // password_env is a warning, not included in required checks
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Git Installation", &self.git),
            ("Gitea Authentication", &self.service_auth),
            ("Destination Directory", &self.destination),
            ("Password Environment", &self.password_env),
        ]
    }

    /// Check git installation
    fn check_git() -> CheckResult {
        match std::process::Command::new("git").arg("--version").output() {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                CheckResult::ok_with_details("Git installed", version.trim().to_string())
            }
            Ok(_) => CheckResult::error("Git command failed"),
            Err(_) => CheckResult::error_with_details(
                "Git not found in PATH",
                "Install git: https://git-scm.com/downloads",
            ),
        }
    }

    /// Check Gitea authentication by logging in with configured credentials
    async fn check_service_auth(config: &Config) -> CheckResult {
        let Some(username) = config.service.username.clone() else {
            return CheckResult::error_with_details(
                "No username configured",
                "Set service.username in the config file or pass --user",
            );
        };
        let Ok(password) = std::env::var(PASSWORD_ENV) else {
            return CheckResult::error_with_details(
                "No password available",
                format!("Export {PASSWORD_ENV} before running"),
            );
        };

        match Session::login(&config.service.url, &username, &password).await {
            Ok(session) => CheckResult::ok_with_details(
                "Gitea authentication successful",
                format!("{} as {}", config.service.url, session.username()),
            ),
            Err(e) => CheckResult::error_with_details(
                "Gitea authentication failed",
                e.to_string(),
            ),
        }
    }

    /// Check destination directory exists
    fn check_destination(config: &Config) -> CheckResult {
        match shellexpand::full(&config.sync.destination) {
            Ok(expanded) => {
                let path = Path::new(expanded.as_ref());
                if path.exists() {
                    CheckResult::ok_with_details("Destination directory exists", expanded.to_string())
                } else {
                    CheckResult::error_with_details(
                        "Destination directory does not exist",
                        format!("Run: mkdir -p {}", expanded),
                    )
                }
            }
            Err(e) => CheckResult::error_with_details(
                "Invalid destination directory path",
                e.to_string(),
            ),
        }
    }

    /// Check the password environment variable (warning only; `doctor` may be
    /// run before credentials are set up)
    fn check_password_env() -> CheckResult {
        if std::env::var(PASSWORD_ENV).is_ok() {
            CheckResult::ok(format!("{PASSWORD_ENV} is set"))
        } else {
            CheckResult::warning_with_details(
                format!("{PASSWORD_ENV} is not set"),
                "Authenticated commands will fail until it is exported",
            )
        }
    }
}
