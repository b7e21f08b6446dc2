//! Build metadata embedded by `build.rs`.

/// Crate version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

const GIT_BRANCH: Option<&str> = option_env!("VERGEN_GIT_BRANCH");
const GIT_SHA: Option<&str> = option_env!("VERGEN_GIT_SHA");
const GIT_DIRTY: Option<&str> = option_env!("VERGEN_GIT_DIRTY");
const BUILD_TIMESTAMP: Option<&str> = option_env!("VERGEN_BUILD_TIMESTAMP");

/// Where this binary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub branch: Option<&'static str>,
    pub sha: Option<&'static str>,
    pub dirty: bool,
    pub built_at: Option<&'static str>,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: PKG_VERSION,
            branch: GIT_BRANCH,
            sha: GIT_SHA,
            dirty: GIT_DIRTY == Some("true"),
            built_at: BUILD_TIMESTAMP,
        }
    }

    /// `{version}` outside a git checkout, otherwise
    /// `{version}+{branch}.{sha7}[.dirty]`.
    pub fn version_string(&self) -> String {
        let (Some(branch), Some(sha)) = (self.branch, self.sha) else {
            return self.version.to_string();
        };
        let short = sha.get(..7).unwrap_or(sha);
        let dirty = if self.dirty { ".dirty" } else { "" };
        format!("{}+{branch}.{short}{dirty}", self.version)
    }
}

/// Version string of the running build.
pub fn version_string() -> String {
    BuildInfo::current().version_string()
}
