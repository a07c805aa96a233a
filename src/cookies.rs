//! Browser-exported cookie bundle used to authenticate subtitle downloads

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// How old the cookie bundle is relative to the configured thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieFreshness {
    Fresh { age_days: i64 },
    Aging { age_days: i64 },
    Stale { age_days: i64 },
}

impl CookieFreshness {
    pub fn classify(age_days: i64, warn_days: i64, stale_days: i64) -> Self {
        if age_days > stale_days {
            CookieFreshness::Stale { age_days }
        } else if age_days > warn_days {
            CookieFreshness::Aging { age_days }
        } else {
            CookieFreshness::Fresh { age_days }
        }
    }
}

/// Credentials handle passed to every fetch. `path` is only set when the
/// configured file actually exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieBundle {
    path: Option<PathBuf>,
}

impl CookieBundle {
    /// Resolve the configured cookies file; a missing file means unauthenticated
    pub fn resolve(configured: Option<&Path>) -> Self {
        let path = configured.filter(|p| p.exists()).map(Path::to_path_buf);
        Self { path }
    }

    pub fn anonymous() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.path.is_some()
    }

    /// Whole days since the bundle was last modified
    pub fn age_days(&self) -> std::io::Result<Option<i64>> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let modified: DateTime<Local> = std::fs::metadata(path)?.modified()?.into();
        Ok(Some((Local::now() - modified).num_days()))
    }

    /// Log which credentials will be used and warn when they are getting old
    pub fn log_status(&self, warn_days: i64, stale_days: i64) {
        let Some(path) = &self.path else {
            warn!("⚠️  No cookies file found. This may trigger YouTube's anti-bot detection.");
            info!(
                "To export cookies: install a browser extension like 'Get cookies.txt LOCALLY' \
                 and export cookies from youtube.com while logged in."
            );
            return;
        };

        info!("🍪 Using cookies file: {}", path.display());

        match self.age_days() {
            Ok(Some(age)) => match CookieFreshness::classify(age, warn_days, stale_days) {
                CookieFreshness::Stale { age_days } => warn!(
                    "⚠️  Cookies file is {} days old. YouTube cookies should be refreshed every {} days for best results.",
                    age_days, stale_days
                ),
                CookieFreshness::Aging { age_days } => {
                    warn!("Cookies file is {} days old. Consider refreshing soon.", age_days)
                }
                CookieFreshness::Fresh { age_days } => {
                    info!("Cookies file is {} days old (fresh)", age_days)
                }
            },
            Ok(None) => {}
            Err(e) => warn!("Could not check cookies age: {}", e),
        }
    }
}
