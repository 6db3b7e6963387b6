//! Host setup checks
//!
//! Visual simulations backed by an external game runtime need a few things
//! on the host: the runtime executable on `PATH`, the game's data directory,
//! and a registered environment id. [`HostRequirements::check`] collects
//! these into a [`RequirementReport`]; [`smoke_test_environment`] resets any
//! registered environment and takes one random step.

use std::{
    env,
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use rand::Rng;

use crate::{
    env::{EnvRegistry, SpaceInfo, SpaceType},
    error::{Error, MissingCause, Result, Stage},
};

/// Name of the game data directory under the home (or `%APPDATA%`) folder
pub const GAME_DIR_NAME: &str = ".minecraft";

/// Default runtime executable
pub const DEFAULT_RUNTIME: &str = "java";

/// How long `<runtime> -version` may take
pub const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Locate `name` on the `PATH` environment variable
pub fn find_executable(name: &str) -> Result<PathBuf> {
    let path_var = env::var_os("PATH").unwrap_or_default();
    find_executable_in(name, &path_var)
}

/// Locate `name` in a `PATH`-style list of directories
pub fn find_executable_in(name: &str, path_var: &OsStr) -> Result<PathBuf> {
    let candidates: Vec<String> = if cfg!(windows) {
        vec![format!("{name}.exe"), name.to_string()]
    } else {
        vec![name.to_string()]
    };

    env::split_paths(path_var)
        .flat_map(|dir| candidates.iter().map(move |file| dir.join(file)))
        .find(|path| is_executable(path))
        .ok_or_else(|| {
            Error::missing(
                Stage::Setup,
                format!("executable '{name}'"),
                MissingCause::NotInstalled,
                format!("install {name} and make sure its directory is on PATH"),
            )
        })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata().map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0).unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Locate the game data directory
///
/// Checks `$HOME/.minecraft`, then `%APPDATA%/.minecraft`.
pub fn find_game_dir() -> Result<PathBuf> {
    let home = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE")).map(PathBuf::from);
    let appdata = env::var_os("APPDATA").map(PathBuf::from);
    find_game_dir_in(home.as_deref(), appdata.as_deref())
}

/// [`find_game_dir`] with explicit base directories
pub fn find_game_dir_in(home: Option<&Path>, appdata: Option<&Path>) -> Result<PathBuf> {
    [home, appdata]
        .into_iter()
        .flatten()
        .map(|base| base.join(GAME_DIR_NAME))
        .find(|dir| dir.is_dir())
        .ok_or_else(|| {
            Error::missing(
                Stage::Setup,
                format!("game directory '{GAME_DIR_NAME}'"),
                MissingCause::NotInstalled,
                "install the Java edition of the game and start it once so its data directory exists",
            )
        })
}

/// Whether `<executable> -version` exits successfully within `timeout`
pub fn check_executable_runs(executable: &Path, timeout: Duration) -> bool {
    let child = Command::new(executable)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    let mut child = match child {
        Ok(child) => child,
        Err(e) => {
            tracing::debug!(executable = %executable.display(), error = %e, "Failed to spawn");
            return false;
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return status.success(),
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(25)),
            Ok(None) => {
                tracing::warn!(executable = %executable.display(), ?timeout, "Version check timed out");
                if let Err(e) = child.kill() {
                    tracing::debug!(executable = %executable.display(), error = %e, "Failed to kill");
                }
                if let Err(e) = child.wait() {
                    tracing::debug!(executable = %executable.display(), error = %e, "Failed to reap");
                }
                return false;
            }
            Err(e) => {
                tracing::debug!(executable = %executable.display(), error = %e, "Failed to poll");
                return false;
            }
        }
    }
}

/// Outcome of one named check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementCheck {
    /// What was checked
    pub name: String,
    /// Whether it passed
    pub passed: bool,
    /// Location found, or why it failed
    pub detail: String,
}

/// Collected host checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementReport {
    /// Checks in the order they ran
    pub checks: Vec<RequirementCheck>,
}

impl RequirementReport {
    fn push(&mut self, name: &str, outcome: std::result::Result<String, String>) {
        let (passed, detail) = match outcome {
            Ok(detail) => (true, detail),
            Err(detail) => (false, detail),
        };
        self.checks.push(RequirementCheck { name: name.to_string(), passed, detail });
    }

    /// True when every check passed
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|check| check.passed)
    }

    /// Names of failed checks
    pub fn failures(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().filter(|c| !c.passed).map(|c| c.name.as_str())
    }

    /// Log one line per check
    pub fn log(&self) {
        for check in &self.checks {
            if check.passed {
                tracing::info!("✓ {}: {}", check.name, check.detail);
            } else {
                tracing::warn!("✗ {}: {}", check.name, check.detail);
            }
        }
    }

    /// Turn a failed report into a [`Error::DependencyMissing`]
    pub fn into_result(self) -> Result<Self> {
        if self.all_passed() {
            return Ok(self);
        }
        let failed: Vec<&str> = self.failures().collect();
        Err(Error::missing(
            Stage::Setup,
            failed.join(", "),
            MissingCause::NotInstalled,
            "see setup::setup_instructions() for the steps to install them",
        ))
    }
}

impl fmt::Display for RequirementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let symbol = if check.passed { '✓' } else { '✗' };
            writeln!(f, "{symbol} {}: {}", check.name, check.detail)?;
        }
        Ok(())
    }
}

/// What a visual game-backed environment needs on this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRequirements {
    /// Runtime executable name looked up on `PATH`
    pub runtime: String,
    /// Explicit runtime path, skipping the `PATH` lookup
    pub runtime_path: Option<PathBuf>,
    /// Explicit game directory, skipping discovery
    pub game_dir: Option<PathBuf>,
    /// Environment id that must be registered
    pub env_id: String,
}

impl HostRequirements {
    /// Requirements for `env_id` with default discovery
    pub fn new(env_id: impl Into<String>) -> Self {
        Self {
            runtime: DEFAULT_RUNTIME.to_string(),
            runtime_path: None,
            game_dir: None,
            env_id: env_id.into(),
        }
    }

    /// Run every check
    pub fn check(&self, registry: &EnvRegistry) -> RequirementReport {
        let mut report = RequirementReport::default();

        let runtime = match &self.runtime_path {
            Some(path) => Ok(path.clone()),
            None => find_executable(&self.runtime),
        };
        report.push(
            &self.runtime,
            match runtime {
                Ok(path) if check_executable_runs(&path, VERSION_CHECK_TIMEOUT) => {
                    Ok(path.display().to_string())
                }
                Ok(path) => Err(format!("{} did not run '-version' successfully", path.display())),
                Err(e) => Err(e.to_string()),
            },
        );

        let game_dir = match &self.game_dir {
            Some(dir) if dir.is_dir() => Ok(dir.clone()),
            Some(dir) => Err(format!("{} does not exist", dir.display())),
            None => find_game_dir().map_err(|e| e.to_string()),
        };
        report.push("game directory", game_dir.map(|dir| dir.display().to_string()));

        report.push(
            "environment",
            if registry.contains(&self.env_id) {
                Ok(format!("'{}' is registered", self.env_id))
            } else {
                Err(format!("'{}' is not registered", self.env_id))
            },
        );

        report
    }
}

/// Step-by-step host setup text
pub fn setup_instructions() -> &'static str {
    "\
=== Setup for game-backed visual environments ===

1. Install the Java edition of the game and start it once,
   so its data directory exists.

2. Install a Java runtime and make sure `java -version` works
   from a terminal (the executable must be on PATH).

3. Register the game-backed environment with an EnvRegistry
   under the id you pass to the agent.

4. Check everything with:
   cargo run --example check_setup

Notes:
- Built-in environments (toy-balance-task, grid-walk-task) need none of this.
- Rendered evaluations can be recorded to a .gif with FrameBuffer.
"
}

/// Result of [`smoke_test_environment`]
#[derive(Debug, Clone, PartialEq)]
pub struct SmokeTestReport {
    /// Environment id under test
    pub env_id: String,
    /// Observation space
    pub observation_space: SpaceInfo,
    /// Action space
    pub action_space: SpaceInfo,
    /// Length of the first observation
    pub observation_len: usize,
    /// Random action taken
    pub action: i64,
    /// Reward of that step
    pub reward: f32,
}

impl fmt::Display for SmokeTestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "✓ environment '{}' created", self.env_id)?;
        writeln!(f, "  action space: {:?}", self.action_space.space_type)?;
        writeln!(f, "  observation space: {:?} {:?}", self.observation_space.space_type, self.observation_space.shape)?;
        writeln!(f, "✓ initial observation: {} values", self.observation_len)?;
        writeln!(f, "✓ step with action {}: reward={}", self.action, self.reward)
    }
}

/// Create `env_id`, reset it, take one random action and close it
pub fn smoke_test_environment(registry: &EnvRegistry, env_id: &str) -> Result<SmokeTestReport> {
    let mut env = registry.make(env_id)?;
    let observation_space = env.observation_space();
    let action_space = env.action_space();

    let observation = env.reset(None)?;
    let SpaceType::Discrete(n) = action_space.space_type else {
        env.close();
        return Err(Error::config(Stage::Setup, format!("'{env_id}' has no discrete action space")));
    };
    let action = rand::thread_rng().gen_range(0..n.max(1)) as i64;
    let result = env.step(action)?;
    env.close();

    tracing::info!(env = env_id, action, reward = result.reward, "Environment smoke test passed");
    Ok(SmokeTestReport {
        env_id: env_id.to_string(),
        observation_space,
        action_space,
        observation_len: observation.len(),
        action,
        reward: result.reward,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_missing_executable() {
        let dir = tempdir().unwrap();
        let err = find_executable_in("no-such-runtime", dir.path().as_os_str()).unwrap_err();
        assert!(err.is_dependency_missing());
        assert!(err.to_string().contains("no-such-runtime"));
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_found_on_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let exe = dir.path().join("fake-runtime");
        fs::write(&exe, "#!/bin/sh\nexit 0\n").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

        let found = find_executable_in("fake-runtime", dir.path().as_os_str()).unwrap();
        assert_eq!(found, exe);
        assert!(check_executable_runs(&found, VERSION_CHECK_TIMEOUT));
    }

    #[cfg(unix)]
    #[test]
    fn test_hanging_executable_is_killed_after_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let exe = dir.path().join("slow-runtime");
        fs::write(&exe, "#!/bin/sh\nexec sleep 30\n").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

        let started = Instant::now();
        assert!(!check_executable_runs(&exe, Duration::from_millis(200)));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_nonexistent_executable_does_not_run() {
        assert!(!check_executable_runs(Path::new("/definitely/not/here"), Duration::from_secs(1)));
    }

    #[test]
    fn test_game_dir_lookup_order() {
        let home = tempdir().unwrap();
        let appdata = tempdir().unwrap();
        fs::create_dir(appdata.path().join(GAME_DIR_NAME)).unwrap();

        let found = find_game_dir_in(Some(home.path()), Some(appdata.path())).unwrap();
        assert_eq!(found, appdata.path().join(GAME_DIR_NAME));

        fs::create_dir(home.path().join(GAME_DIR_NAME)).unwrap();
        let found = find_game_dir_in(Some(home.path()), Some(appdata.path())).unwrap();
        assert_eq!(found, home.path().join(GAME_DIR_NAME));

        assert!(find_game_dir_in(None, None).unwrap_err().is_dependency_missing());
    }

    #[test]
    fn test_report_for_missing_pieces() {
        let registry = EnvRegistry::with_builtins();
        let missing = tempdir().unwrap().path().join("gone");
        let requirements = HostRequirements {
            runtime: "java".into(),
            runtime_path: Some(missing.clone()),
            game_dir: Some(missing),
            env_id: "toy-balance-task".into(),
        };

        let report = requirements.check(&registry);
        assert_eq!(report.checks.len(), 3);
        assert!(!report.all_passed());
        assert_eq!(report.failures().collect::<Vec<_>>(), vec!["java", "game directory"]);
        assert!(report.to_string().contains("✓ environment"));

        let err = report.into_result().unwrap_err();
        assert!(err.is_dependency_missing());
        assert!(err.to_string().contains("java, game directory"));
    }

    #[test]
    fn test_smoke_test_builtin_environment() {
        let registry = EnvRegistry::with_builtins();
        let report = smoke_test_environment(&registry, "CartPole-v1").unwrap();
        assert_eq!(report.observation_len, 4);
        assert!((0..2).contains(&report.action));
        assert_eq!(report.reward, 1.0);

        assert!(smoke_test_environment(&registry, "MineRLNavigate-v0").unwrap_err().is_dependency_missing());
    }

    #[test]
    fn test_instructions_mention_check_command() {
        assert!(setup_instructions().contains("check_setup"));
    }
}
